// Unit tests for domain models

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::adapters::sources::MemorySource;
    use crate::domain::errors::*;
    use crate::domain::model::*;
    use crate::ports::ByteSource;

    fn create_test_selection(name: &str) -> SelectionRecord {
        let source: Arc<dyn ByteSource> =
            Arc::new(MemorySource::new(name, "video/mp4", vec![0u8; 16]));
        SelectionRecord::new(source, ObjectUrl::new(format!("blob:{}", name)))
    }

    fn create_test_job(metadata: Option<MediaMetadata>) -> Job {
        let mut selection = create_test_selection("clip.mp4");
        if let Some(metadata) = metadata {
            selection.apply_metadata(metadata);
        }
        Job::from_selection(selection, InterpolationFactor::default())
    }

    fn metadata(duration: f64, frame_rate: f64) -> MediaMetadata {
        MediaMetadata {
            duration,
            frame_rate,
        }
    }

    #[test]
    fn test_interpolation_factor_validation() {
        assert!(InterpolationFactor::new(0).is_err());
        assert!(matches!(
            InterpolationFactor::new(1),
            Err(DomainError::BadArgs(_))
        ));
        assert_eq!(InterpolationFactor::new(2).unwrap().get(), 2);
        assert_eq!(InterpolationFactor::new(16).unwrap().get(), 16);
        assert_eq!(InterpolationFactor::default().get(), InterpolationFactor::MIN);
    }

    #[test]
    fn test_interpolation_factor_presets_are_valid() {
        for preset in InterpolationFactor::PRESETS {
            assert!(InterpolationFactor::new(preset).is_ok());
        }
    }

    #[test]
    fn test_interpolation_factor_target_rate() {
        let factor = InterpolationFactor::new(3).unwrap();
        assert_eq!(factor.target_frame_rate(24.0), 72.0);
        assert_eq!(factor.to_string(), "3x");
    }

    #[test]
    fn test_interpolation_factor_serde() {
        let factor: InterpolationFactor = serde_json::from_str("4").unwrap();
        assert_eq!(factor.get(), 4);
        assert_eq!(serde_json::to_string(&factor).unwrap(), "4");
        assert!(serde_json::from_str::<InterpolationFactor>("1").is_err());
    }

    #[test]
    fn test_processing_error_classification() {
        assert_eq!(
            ProcessingError::from_failure_message("SharedArrayBuffer is not defined"),
            ProcessingError::SharedArrayBufferUnavailable
        );
        assert_eq!(
            ProcessingError::from_failure_message("disk full"),
            ProcessingError::Unknown {
                detail: Some("disk full".to_string())
            }
        );
        assert_eq!(
            ProcessingError::from_failure_message("  ").detail(),
            Some("Unknown error")
        );
    }

    #[test]
    fn test_processing_error_exit_status() {
        let error = ProcessingError::exit_status(1);
        assert_eq!(error.tag(), "unknown");
        assert!(error.detail().unwrap().contains('1'));
        assert_eq!(error.to_string(), format!("unknown: {}", error.detail().unwrap()));
    }

    #[test]
    fn test_processing_error_serialized_tags() {
        assert_eq!(
            serde_json::to_value(ProcessingError::Metadata).unwrap(),
            serde_json::json!({"type": "metadata"})
        );
        assert_eq!(
            serde_json::to_value(ProcessingError::SharedArrayBufferUnavailable).unwrap(),
            serde_json::json!({"type": "shared-array-buffer-unavailable"})
        );
        assert_eq!(
            serde_json::to_value(ProcessingError::Unknown { detail: None }).unwrap(),
            serde_json::json!({"type": "unknown"})
        );
    }

    #[test]
    fn test_selection_record_defaults() {
        let mut selection = create_test_selection("a.mp4");
        assert_eq!(selection.file_name(), "a.mp4");
        assert_eq!(selection.duration(), None);
        assert!(selection.is_valid());
        assert!(!selection.is_paused());

        selection.toggle_paused();
        assert!(selection.is_paused());

        selection.mark_error();
        assert!(selection.has_error());
        assert!(!selection.is_valid());
    }

    #[test]
    fn test_job_from_selection_moves_preview_url() {
        let mut selection = create_test_selection("a.mp4");
        selection.apply_metadata(metadata(10.0, 24.0));
        let selection_id = selection.id();
        let preview = selection.preview_url().clone();

        let job = Job::from_selection(selection, InterpolationFactor::new(4).unwrap());
        assert_eq!(job.original_url(), &preview);
        assert_eq!(job.status(), &JobStatus::Queued);
        assert_eq!(job.progress(), 0.0);
        assert_eq!(job.factor().get(), 4);
        assert_eq!(job.metadata(), Some(metadata(10.0, 24.0)));
        assert_ne!(job.id().to_string(), selection_id.to_string());
    }

    #[test]
    fn test_job_lifecycle_to_completed() {
        let mut job = create_test_job(Some(metadata(10.0, 24.0)));
        job.start_processing().unwrap();
        assert!(job.is_processing());
        assert_eq!(job.processed_url(), None);

        let url = ObjectUrl::new("blob:result");
        job.complete(url.clone(), metadata(10.0, 48.0)).unwrap();
        assert_eq!(job.status().name(), "completed");
        assert_eq!(job.progress(), 100.0);
        assert_eq!(job.processed_url(), Some(&url));
        assert_eq!(job.frame_rate(), Some(48.0));
        assert_eq!(job.error(), None);
        assert_eq!(job.owned_urls(), vec![job.original_url().clone(), url]);
    }

    #[test]
    fn test_job_error_payload_only_in_error_status() {
        let mut job = create_test_job(None);
        assert_eq!(job.error(), None);

        job.fail(ProcessingError::Metadata).unwrap();
        assert_eq!(job.error(), Some(&ProcessingError::Metadata));
        assert!(job.status().is_terminal());
        assert_eq!(job.processed_url(), None);
        assert_eq!(job.owned_urls().len(), 1);
    }

    #[test]
    fn test_job_invalid_transitions() {
        let mut job = create_test_job(Some(metadata(1.0, 30.0)));
        assert!(matches!(
            job.record_progress(10.0),
            Err(DomainError::InvalidTransition(_))
        ));
        assert!(job
            .complete(ObjectUrl::new("blob:x"), metadata(1.0, 60.0))
            .is_err());

        job.start_processing().unwrap();
        assert!(job.start_processing().is_err());
        assert!(job.merge_metadata(metadata(2.0, 25.0)).is_err());

        job.fail(ProcessingError::exit_status(1)).unwrap();
        assert!(job.fail(ProcessingError::Metadata).is_err());
    }

    #[test]
    fn test_job_progress_is_clamped_and_monotonic() {
        let mut job = create_test_job(Some(metadata(10.0, 24.0)));
        job.start_processing().unwrap();

        job.record_progress(40.0).unwrap();
        job.record_progress(25.0).unwrap();
        assert_eq!(job.progress(), 40.0);

        job.record_progress(f64::NAN).unwrap();
        assert_eq!(job.progress(), 40.0);

        job.record_progress(180.0).unwrap();
        assert_eq!(job.progress(), 100.0);
    }

    #[test]
    fn test_metadata_usability() {
        assert!(metadata(10.0, 24.0).is_usable());
        assert!(!metadata(0.0, 24.0).is_usable());
        assert!(!metadata(10.0, 0.0).is_usable());
        assert!(!metadata(f64::INFINITY, 24.0).is_usable());

        let job = create_test_job(Some(metadata(0.0, 24.0)));
        assert_eq!(job.duration(), Some(0.0));
        assert_eq!(job.metadata(), None);
    }

    #[test]
    fn test_job_merge_metadata_while_queued() {
        let mut job = create_test_job(None);
        assert_eq!(job.metadata(), None);
        job.merge_metadata(metadata(5.0, 25.0)).unwrap();
        assert_eq!(job.duration(), Some(5.0));
        assert_eq!(job.frame_rate(), Some(25.0));
    }

    #[test]
    fn test_job_pause_flag_is_informational() {
        let mut job = create_test_job(Some(metadata(5.0, 25.0)));
        job.toggle_paused();
        assert!(job.is_paused());
        job.start_processing().unwrap();
        assert!(job.is_processing());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(JobStatus::Queued.to_string(), "queued");
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert!(!JobStatus::Processing.is_terminal());
        assert_eq!(JobStatus::Error(ProcessingError::Metadata).name(), "error");
    }
}

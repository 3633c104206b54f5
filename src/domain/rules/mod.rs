// Domain rules - Scheduling and transcoding policies

use crate::domain::model::*;

/// Fixed motion-compensated interpolation parameters appended to every filter graph
pub const INTERPOLATION_POLICY: &str = "mi_mode=mci:mc_mode=aobmc:me_mode=bidir:vsbmc=1";

/// Suffix inserted into the download name of a finished result
pub const RESULT_SUFFIX: &str = "-interpolated";

/// MIME type of every transcoded result
pub const RESULT_MIME_TYPE: &str = "video/mp4";

/// Engine progress events report elapsed time in microseconds
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Business rules deciding which job runs next
pub struct DispatchRules;

impl DispatchRules {
    /// A queued job may run only once both duration and frame rate are known and positive
    pub fn is_eligible(job: &Job) -> bool {
        job.is_queued() && job.metadata().is_some()
    }

    /// A queued job missing either value, or holding a zero duration, needs a background probe
    pub fn needs_metadata(job: &Job) -> bool {
        job.is_queued() && job.metadata().is_none()
    }

    /// Oldest-inserted eligible job, strict FIFO over the given order
    pub fn next_eligible<'a, I>(jobs: I) -> Option<&'a Job>
    where
        I: IntoIterator<Item = &'a Job>,
    {
        jobs.into_iter().find(|job| Self::is_eligible(job))
    }
}

/// Progress arithmetic for engine time signals
pub struct ProgressRules;

impl ProgressRules {
    /// `min(100, elapsed / duration * 100)`; `None` when the duration cannot scale the signal
    pub fn percentage(elapsed_seconds: f64, duration_seconds: f64) -> Option<f64> {
        if duration_seconds.is_nan() || duration_seconds <= 0.0 || !elapsed_seconds.is_finite() {
            return None;
        }
        Some((elapsed_seconds.max(0.0) / duration_seconds * 100.0).min(100.0))
    }

    /// Convert an engine time signal in microseconds to seconds
    pub fn micros_to_seconds(micros: i64) -> f64 {
        micros as f64 / MICROS_PER_SECOND
    }
}

/// Construction of the command issued to the transcoding engine
pub struct InterpolationCommand;

impl InterpolationCommand {
    /// Virtual file name of the output, unique per job
    pub fn output_name(job_id: JobId, file_name: &str) -> String {
        format!("interpolated-{}-{}", job_id, file_name)
    }

    /// Filter graph for the given target frame rate
    pub fn filter_graph(target_frame_rate: f64) -> String {
        format!("minterpolate=fps={}:{}", target_frame_rate, INTERPOLATION_POLICY)
    }

    /// Ordered argument list: input, filter graph, output
    pub fn arguments(input_name: &str, output_name: &str, target_frame_rate: f64) -> Vec<String> {
        vec![
            "-i".to_string(),
            input_name.to_string(),
            "-vf".to_string(),
            Self::filter_graph(target_frame_rate),
            output_name.to_string(),
        ]
    }
}

/// Insert `suffix` before the last extension of `file_name`
pub fn insert_filename_suffix(file_name: &str, suffix: &str) -> String {
    match file_name.rfind('.') {
        Some(dot) => format!("{}{}{}", &file_name[..dot], suffix, &file_name[dot..]),
        None => format!("{}{}", file_name, suffix),
    }
}

/// Name under which a completed result is offered for download
pub fn download_name(file_name: &str) -> String {
    insert_filename_suffix(file_name, RESULT_SUFFIX)
}

/// Parse a numeric field that may be written as a ratio (`"24000/1001"`)
pub fn parse_rate(text: &str) -> Option<f64> {
    let text = text.trim();
    let value = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            num / den
        }
        None => text.parse().ok()?,
    };
    value.is_finite().then_some(value)
}

/// Reduce a rational to a float, rejecting zero denominators
pub fn ratio_to_f64(numerator: i32, denominator: i32) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    let value = numerator as f64 / denominator as f64;
    value.is_finite().then_some(value)
}

/// Defaults used when a probed field is absent or unusable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeDefaults {
    pub duration: f64,
    pub frame_rate: f64,
}

impl Default for ProbeDefaults {
    fn default() -> Self {
        Self {
            duration: 0.0,
            frame_rate: 30.0,
        }
    }
}

impl ProbeDefaults {
    /// Apply the defaults to raw probed values
    pub fn resolve(&self, duration: Option<f64>, frame_rate: Option<f64>) -> MediaMetadata {
        let duration = duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(self.duration);
        let frame_rate = frame_rate
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(self.frame_rate);
        MediaMetadata {
            duration,
            frame_rate,
        }
    }
}

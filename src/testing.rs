//! Deterministic `Prober` / `MediaEncoder` fakes for unit tests.

use crate::encoder::{AudioJob, MediaEncoder, VideoPass};
use crate::error::{CompressError, CompressResult};
use crate::probe::Prober;
use crate::types::MediaProbe;
use async_trait::async_trait;
use std::sync::Mutex;

enum ProbeBehavior {
    Returns(MediaProbe),
    Fails,
}

pub struct FakeProber {
    behavior: ProbeBehavior,
}

impl FakeProber {
    pub fn returning(probe: MediaProbe) -> Self {
        Self { behavior: ProbeBehavior::Returns(probe) }
    }

    pub fn failing() -> Self {
        Self { behavior: ProbeBehavior::Fails }
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _bytes: &[u8]) -> CompressResult<MediaProbe> {
        match &self.behavior {
            ProbeBehavior::Returns(probe) => Ok(probe.clone()),
            ProbeBehavior::Fails => Err(CompressError::Probe("fake probe failure".to_string())),
        }
    }
}

/// Records every job; the final pass / audio encode writes `output_size` bytes
pub struct FakeEncoder {
    output_size: usize,
    fail_pass: Option<u8>,
    fail_audio: bool,
    timeout: bool,
    video_jobs: Mutex<Vec<VideoPass>>,
    audio_jobs: Mutex<Vec<AudioJob>>,
}

impl FakeEncoder {
    pub fn producing(output_size: usize) -> Self {
        Self {
            output_size,
            fail_pass: None,
            fail_audio: false,
            timeout: false,
            video_jobs: Mutex::new(Vec::new()),
            audio_jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on_pass(mut self, pass: u8) -> Self {
        self.fail_pass = Some(pass);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_audio = true;
        self
    }

    pub fn timing_out(mut self) -> Self {
        self.timeout = true;
        self
    }

    pub fn video_jobs(&self) -> Vec<VideoPass> {
        self.video_jobs.lock().unwrap().clone()
    }

    pub fn audio_jobs(&self) -> Vec<AudioJob> {
        self.audio_jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    async fn encode_video_pass(&self, job: &VideoPass) -> CompressResult<()> {
        assert!(job.input.exists(), "input must be written before encoding");
        self.video_jobs.lock().unwrap().push(job.clone());

        if self.timeout {
            return Err(CompressError::Timeout { secs: 300 });
        }
        if self.fail_pass == Some(job.pass) {
            return Err(CompressError::FFmpeg("fake pass failure".to_string()));
        }
        if let Some(ref output) = job.output {
            tokio::fs::write(output, vec![0u8; self.output_size]).await?;
        }
        Ok(())
    }

    async fn encode_audio(&self, job: &AudioJob) -> CompressResult<()> {
        assert!(job.input.exists(), "input must be written before encoding");
        self.audio_jobs.lock().unwrap().push(job.clone());

        if self.timeout {
            return Err(CompressError::Timeout { secs: 120 });
        }
        if self.fail_audio {
            return Err(CompressError::FFmpeg("fake encode failure".to_string()));
        }
        tokio::fs::write(&job.output, vec![0u8; self.output_size]).await?;
        Ok(())
    }
}

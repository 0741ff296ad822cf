use crate::sweep::channel::Channel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The sweep tool could not produce a pass.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{binary} exited with {status}")]
    ExitStatus { binary: String, status: String },
    #[error("replay file {path} unreadable: {source}")]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("replay source holds no sweep passes")]
    Exhausted,
}

/// Anything that can hand back the raw text of one complete sweep pass.
pub trait SweepSource {
    fn sweep(&mut self, channel: &Channel) -> Result<String, SourceError>;
}

impl<S: SweepSource + ?Sized> SweepSource for Box<S> {
    fn sweep(&mut self, channel: &Channel) -> Result<String, SourceError> {
        (**self).sweep(channel)
    }
}

/// Invocation settings for the external `hackrf_sweep` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HackrfConfig {
    pub binary: PathBuf,
    pub bin_width_hz: u32,
    pub passes: u32,
}

impl Default for HackrfConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("hackrf_sweep"),
            bin_width_hz: 131_072,
            passes: 1,
        }
    }
}

/// Runs the sweep tool once per pass and collects its standard output.
pub struct HackrfSweep {
    config: HackrfConfig,
}

impl HackrfSweep {
    pub fn new(config: HackrfConfig) -> Self {
        Self { config }
    }

    pub fn command(&self, channel: &Channel) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("-f")
            .arg(channel.range_arg())
            .arg("-N")
            .arg(self.config.passes.to_string())
            .arg("-w")
            .arg(self.config.bin_width_hz.to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl SweepSource for HackrfSweep {
    fn sweep(&mut self, channel: &Channel) -> Result<String, SourceError> {
        let binary = self.config.binary.display().to_string();
        let output = self
            .command(channel)
            .output()
            .map_err(|source| SourceError::Launch {
                binary: binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SourceError::ExitStatus {
                binary,
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Plays back recorded passes in order, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    passes: Vec<String>,
    cursor: usize,
}

impl ReplaySource {
    pub fn from_passes(passes: Vec<String>) -> Self {
        Self { passes, cursor: 0 }
    }

    /// Loads a recording in which passes are separated by blank lines.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| SourceError::Replay {
            path: path_ref.to_path_buf(),
            source,
        })?;
        Ok(Self::from_passes(split_passes(&contents)))
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl SweepSource for ReplaySource {
    fn sweep(&mut self, _channel: &Channel) -> Result<String, SourceError> {
        if self.passes.is_empty() {
            return Err(SourceError::Exhausted);
        }
        let pass = self.passes[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.passes.len();
        Ok(pass)
    }
}

fn split_passes(contents: &str) -> Vec<String> {
    let mut passes = Vec::new();
    let mut current = String::new();
    for line in contents.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                passes.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        passes.push(current);
    }
    passes
}

//! Folded-stack files and flamegraph rendering

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::ChlensError;
use super::profile::Trace;
use crate::core::constants::{
    FLAMEGRAPH_DATA_SUFFIX, FLAMEGRAPH_IMAGE_SUFFIX, RENDERER_INPUT_PLACEHOLDER,
    RENDERER_OUTPUT_PLACEHOLDER,
};
use crate::utils::file::ensure_dir;

/// Paths of the files written for one trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlamegraphArtifacts {
    pub data_path: PathBuf,
    pub image_path: PathBuf,
}

/// Writes `<query_id>.flamegraph.data` and renders it with an external
/// program.
///
/// The renderer is an argv. `{input}` is replaced by the data path and
/// `{output}` by the image path; without an `{output}` argument the
/// program's stdout is saved as the image.
pub struct FlamegraphWriter {
    renderer: Vec<String>,
}

impl FlamegraphWriter {
    pub fn new(renderer: Vec<String>) -> Self {
        Self { renderer }
    }

    /// One `root;...;leaf count` line per sample, in trace order
    pub fn fold(trace: &Trace) -> String {
        trace
            .samples
            .iter()
            .map(|s| format!("{} {}", s.stack.join(";"), s.count))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write only the folded data file
    pub async fn write_data(&self, trace: &Trace, out_dir: &Path) -> Result<PathBuf, ChlensError> {
        ensure_dir(out_dir)?;
        let data_path = artifact_path(out_dir, trace, FLAMEGRAPH_DATA_SUFFIX);
        let mut folded = Self::fold(trace);
        folded.push('\n');
        tokio::fs::write(&data_path, folded).await?;
        tracing::info!(path = %data_path.display(), "Wrote folded stacks");
        Ok(data_path)
    }

    /// Write the data file, then render the image next to it.
    ///
    /// A rendering failure leaves the data file in place and reports its
    /// path in [`ChlensError::Render`].
    pub async fn write(&self, trace: &Trace, out_dir: &Path) -> Result<FlamegraphArtifacts, ChlensError> {
        let data_path = self.write_data(trace, out_dir).await?;
        let image_path = artifact_path(out_dir, trace, FLAMEGRAPH_IMAGE_SUFFIX);

        if let Err(reason) = self.render(&data_path, &image_path).await {
            return Err(ChlensError::Render { data_path, reason });
        }

        tracing::info!(path = %image_path.display(), "Rendered flamegraph");
        Ok(FlamegraphArtifacts {
            data_path,
            image_path,
        })
    }

    async fn render(&self, data_path: &Path, image_path: &Path) -> Result<(), String> {
        let Some((program, args)) = self.renderer.split_first() else {
            return Err("no renderer configured".to_string());
        };

        let input = data_path.to_string_lossy();
        let output = image_path.to_string_lossy();
        let to_stdout = !args.iter().any(|a| a.contains(RENDERER_OUTPUT_PLACEHOLDER));
        let args: Vec<String> = args
            .iter()
            .map(|a| {
                a.replace(RENDERER_INPUT_PLACEHOLDER, &input)
                    .replace(RENDERER_OUTPUT_PLACEHOLDER, &output)
            })
            .collect();

        tracing::debug!(program = %program, ?args, "Running flamegraph renderer");
        let result = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(if to_stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(format!("renderer '{}' not found", program));
            }
            Err(e) => return Err(format!("failed to run '{}': {}", program, e)),
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(format!(
                "'{}' exited with {}: {}",
                program,
                out.status,
                stderr.trim()
            ));
        }

        if to_stdout {
            tokio::fs::write(image_path, &out.stdout)
                .await
                .map_err(|e| format!("writing {}: {}", image_path.display(), e))?;
        }
        Ok(())
    }
}

fn artifact_path(out_dir: &Path, trace: &Trace, suffix: &str) -> PathBuf {
    out_dir.join(format!("{}.{}", trace.query_id, suffix))
}

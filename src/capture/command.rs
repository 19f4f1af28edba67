//! 外部命令录音（默认 arecord）
//!
//! 参数模板中的 `{duration}`（秒）与 `{path}` 在执行前替换；命令无法启动、非零退出
//! 或未生成文件都视为设备错误。出错时本次录音的残留文件会被删除。

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{record_file_name, Capture, CaptureOutput};
use crate::core::LifecycleError;
use crate::store::UnitId;

pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    record_dir: PathBuf,
}

/// 录音进程的结束方式
enum Finish {
    Exited(ExitStatus),
    Interrupted,
    TimedOut(Duration),
    WaitFailed(std::io::Error),
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>, record_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            record_dir: record_dir.into(),
        }
    }

    fn render_args(&self, duration: Duration, path: &Path) -> Vec<String> {
        let secs = duration.as_secs().max(1).to_string();
        let path = path.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace("{duration}", &secs).replace("{path}", &path))
            .collect()
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "partial recording removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove partial recording"),
    }
}

#[async_trait]
impl Capture for CommandCapture {
    async fn capture_once(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutput, LifecycleError> {
        if !self.record_dir.is_dir() {
            return Err(LifecycleError::Device(format!(
                "record directory {} does not exist",
                self.record_dir.display()
            )));
        }
        if cancel.is_cancelled() {
            return Err(LifecycleError::Device("capture cancelled before start".into()));
        }

        let id = UnitId::new();
        let started_at = Utc::now();
        let path = self.record_dir.join(record_file_name(&id, started_at));
        let args = self.render_args(duration, &path);
        tracing::info!(program = %self.program, path = %path.display(), secs = duration.as_secs(), "capture start");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LifecycleError::Device(format!("cannot start {}: {e}", self.program)))?;
        let stderr = child.stderr.take();
        let stderr_reader = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut text).await;
            }
            text
        });

        // 留出命令自身启动与收尾的余量
        let deadline = duration + Duration::from_secs(30);
        let finish = tokio::select! {
            biased;
            _ = cancel.cancelled() => Finish::Interrupted,
            waited = tokio::time::timeout(deadline, child.wait()) => match waited {
                Ok(Ok(status)) => Finish::Exited(status),
                Ok(Err(e)) => Finish::WaitFailed(e),
                Err(_) => Finish::TimedOut(deadline),
            },
        };
        if !matches!(finish, Finish::Exited(_)) {
            // kill 会等待进程退出，之后文件不再被写入
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "recorder already gone");
            }
        }
        let ended_at = Utc::now();
        // 被杀掉的录音命令可能留下仍持有 stderr 的子进程，只在正常退出时读取
        let stderr = if matches!(finish, Finish::Exited(_)) {
            stderr_reader.await.unwrap_or_default()
        } else {
            stderr_reader.abort();
            String::new()
        };

        let failure = match finish {
            Finish::Exited(status) if status.success() => None,
            Finish::Exited(status) => Some(format!("{} exited with {}: {}", self.program, status, stderr.trim())),
            Finish::WaitFailed(e) => Some(format!("cannot wait for {}: {e}", self.program)),
            Finish::TimedOut(deadline) => Some(format!("capture timed out after {}s", deadline.as_secs())),
            Finish::Interrupted => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() > 0 => {
                    tracing::warn!(path = %path.display(), bytes = meta.len(), "capture interrupted, keeping partial recording");
                    return Ok(CaptureOutput {
                        id,
                        path,
                        started_at,
                        ended_at,
                        size_bytes: meta.len(),
                    });
                }
                _ => Some("capture interrupted before any audio was written".to_string()),
            },
        };
        if let Some(message) = failure {
            discard_partial(&path).await;
            return Err(LifecycleError::Device(message));
        }

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| LifecycleError::Device(format!("no output at {}: {e}", path.display())))?
            .len();

        Ok(CaptureOutput {
            id,
            path,
            started_at,
            ended_at,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let capture = CommandCapture::new(
            "arecord",
            vec!["-d".into(), "{duration}".into(), "{path}".into()],
            "/tmp",
        );
        let args = capture.render_args(Duration::from_secs(30), Path::new("/tmp/r.wav"));
        assert_eq!(args, vec!["-d", "30", "/tmp/r.wav"]);
    }

    #[tokio::test]
    async fn test_missing_record_dir_is_device_error() {
        let capture = CommandCapture::new("true", vec![], "/nonexistent/earshot/records");
        let err = capture
            .capture_once(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Device(_)));
    }

    #[tokio::test]
    async fn test_unknown_program_is_device_error() {
        let dir = TempDir::new().unwrap();
        let capture = CommandCapture::new("earshot-no-such-recorder", vec![], dir.path());
        let err = capture
            .capture_once(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Device(msg) if msg.contains("cannot start")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_becomes_capture() {
        let dir = TempDir::new().unwrap();
        let capture = CommandCapture::new(
            "sh",
            vec!["-c".into(), "printf RIFF > {path}".into()],
            dir.path(),
        );
        let out = capture
            .capture_once(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.size_bytes, 4);
        assert!(out.path.starts_with(dir.path()));
        assert!(out.ended_at >= out.started_at);

        let suffix = out.id.as_uuid().simple().to_string();
        let name = out.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains(&suffix[suffix.len() - 12..]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let capture = CommandCapture::new(
            "sh",
            vec!["-c".into(), "printf RIFF > {path}; echo busy >&2; exit 1".into()],
            dir.path(),
        );
        let err = capture
            .capture_once(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Device(msg) if msg.contains("busy")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_keeps_partial_recording() {
        let dir = TempDir::new().unwrap();
        let capture = CommandCapture::new(
            "sh",
            vec!["-c".into(), "printf RIFFDATA > {path}; exec sleep 5".into()],
            dir.path(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let out = capture.capture_once(Duration::from_secs(5), &cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(out.size_bytes, 8);
        assert!(out.path.is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_before_any_audio_removes_file() {
        let dir = TempDir::new().unwrap();
        let capture = CommandCapture::new(
            "sh",
            vec!["-c".into(), ": > {path}; exec sleep 5".into()],
            dir.path(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let err = capture.capture_once(Duration::from_secs(5), &cancel).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Device(msg) if msg.contains("interrupted")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

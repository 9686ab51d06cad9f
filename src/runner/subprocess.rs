//! 子进程研究引擎
//!
//! 运行配置的命令（任务描述作为最后一个参数），引擎配置以 JSON 写入 stdin。
//! stdout 每行：能解析为 ProgressEvent 的立即转发；其他 JSON 行记为候选结果（取最后一条），其余文本拼成纯文本结果。
//! 读行线程与主循环之间用 std mpsc 连接，主循环每 200ms 检查一次中止标志，置位时杀掉子进程。

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use serde_json::Value;

use crate::core::AbortFlag;
use crate::runner::{
    EngineCallbacks, EngineConfig, EngineError, EngineOutput, ProgressEvent, ResearchEngine,
};

const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 以外部命令实现的研究引擎
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    program: String,
    args: Vec<String>,
}

impl SubprocessEngine {
    /// command[0] 为程序，其余为固定参数；空命令返回 None
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

/// 逐行分类 stdout
#[derive(Debug, Default)]
struct OutputCollector {
    last_json: Option<Value>,
    text: Vec<String>,
}

impl OutputCollector {
    fn accept(&mut self, line: &str, callbacks: &dyn EngineCallbacks) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => match serde_json::from_value::<ProgressEvent>(value.clone()) {
                Ok(event) => callbacks.emit(event),
                Err(_) => self.last_json = Some(value),
            },
            Err(_) => self.text.push(trimmed.to_string()),
        }
    }

    fn into_output(self) -> EngineOutput {
        match self.last_json {
            Some(v) => v,
            None if self.text.is_empty() => Value::Null,
            None => Value::String(self.text.join("\n")),
        }
    }
}

impl ResearchEngine for SubprocessEngine {
    fn invoke(
        &self,
        task: &str,
        config: &EngineConfig,
        abort: &AbortFlag,
        callbacks: &dyn EngineCallbacks,
    ) -> Result<EngineOutput, EngineError> {
        let config_json = serde_json::to_vec(config)
            .map_err(|e| EngineError::Failed(format!("failed to encode engine config: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(task)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Failed(format!("failed to spawn '{}': {}", self.program, e)))?;

        tracing::info!(program = %self.program, pid = child.id(), "Research engine process spawned");

        if let Some(mut stdin) = child.stdin.take() {
            // 子进程可能不读 stdin，写失败不算错误
            if let Err(e) = stdin.write_all(&config_json) {
                tracing::debug!("engine stdin write failed: {}", e);
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Failed("engine stdout unavailable".to_string()))?;
        let (line_tx, line_rx) = mpsc::channel::<String>();
        let reader = std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(l) => {
                        if line_tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let mut collector = OutputCollector::default();
        loop {
            if abort.is_requested() {
                tracing::info!("Abort flag observed, killing research engine process");
                let _ = child.kill();
                let _ = child.wait();
                // 孙进程可能仍持有 stdout，读行线程不 join
                return Err(EngineError::Aborted);
            }
            match line_rx.recv_timeout(ABORT_POLL_INTERVAL) {
                Ok(line) => collector.accept(&line, callbacks),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let _ = reader.join();
        let status = child
            .wait()
            .map_err(|e| EngineError::Failed(format!("failed to wait for engine: {}", e)))?;
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let detail = stderr.trim();
            return Err(EngineError::Failed(if detail.is_empty() {
                format!("engine exited with {}", status)
            } else {
                detail.to_string()
            }));
        }

        Ok(collector.into_output())
    }
}

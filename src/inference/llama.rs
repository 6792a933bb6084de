use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CompletionBackend, CompletionRequest, InferenceError, CONTEXT_SIZE, THREADS};
use crate::config::InferenceConfig;

/// Timeout for establishing a connection to the runtime.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a whole completion request (10 minutes).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for a single readiness probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between readiness probes while the model loads.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A runtime process this backend started, and the port it was told to use.
struct Runtime {
    child: Child,
    port: u16,
}

impl Runtime {
    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Completion backend driving a llama.cpp `llama-server` process.
///
/// The runtime is started on the first completion with the configured model
/// file and then reused for the life of this value, so the weights are
/// loaded once per process. [`CompletionBackend::shutdown`] (or drop) stops
/// it.
///
/// Each runtime listens on a port that was free when it was started: a
/// fresh one from the OS unless a fixed port is configured, in which case
/// the port must not already be bound. Anything else answering on the
/// loopback interface is never used.
pub struct LlamaServerBackend {
    config: InferenceConfig,
    runtime: Mutex<Option<Runtime>>,
}

impl LlamaServerBackend {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            runtime: Mutex::new(None),
        }
    }

    fn lock_runtime(&self) -> MutexGuard<'_, Option<Runtime>> {
        self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Port for a new runtime: whatever the OS hands out for `127.0.0.1:0`,
    /// or the configured port, which must currently be unbound.
    fn reserve_port(&self) -> Result<u16, InferenceError> {
        let wanted = self.config.port.unwrap_or(0);
        let listener = TcpListener::bind(("127.0.0.1", wanted))
            .map_err(|source| InferenceError::PortUnavailable { port: wanted, source })?;
        let port = listener
            .local_addr()
            .map_err(|source| InferenceError::PortUnavailable { port: wanted, source })?
            .port();
        // Released here so the runtime can bind it.
        drop(listener);
        Ok(port)
    }

    /// Base URL of a live runtime, starting one if needed.
    fn ensure_running(&self) -> Result<String, InferenceError> {
        let mut runtime = self.lock_runtime();

        if let Some(current) = runtime.as_mut() {
            match current.child.try_wait() {
                Ok(None) => return Ok(current.base_url()),
                Ok(Some(status)) => warn!(%status, "inference runtime exited; restarting"),
                Err(e) => warn!("cannot poll inference runtime: {e}; restarting"),
            }
            *runtime = None;
        }

        let port = self.reserve_port()?;
        info!(
            model = %self.config.model_path.display(),
            bin = %self.config.server_bin.display(),
            port,
            "starting inference runtime"
        );

        let child = Command::new(&self.config.server_bin)
            .arg("--model")
            .arg(&self.config.model_path)
            .args(["--ctx-size", &CONTEXT_SIZE.to_string()])
            .args(["--threads", &THREADS.to_string()])
            .args(["--host", "127.0.0.1"])
            .args(["--port", &port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(InferenceError::Spawn)?;

        let mut started = Runtime { child, port };
        if let Err(e) = self.wait_until_ready(&mut started) {
            let _ = started.child.kill();
            let _ = started.child.wait();
            return Err(e);
        }

        info!(port, "inference runtime ready");
        let url = started.base_url();
        *runtime = Some(started);
        Ok(url)
    }

    /// Poll `/health` until the runtime reports the model is loaded.
    ///
    /// The child must still be alive after a successful probe; a runtime
    /// that exits during load (for example because it could not bind its
    /// port) is an error even if something else answered.
    fn wait_until_ready(&self, runtime: &mut Runtime) -> Result<(), InferenceError> {
        let client = Client::builder()
            .connect_timeout(HEALTH_TIMEOUT)
            .timeout(HEALTH_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;
        let url = format!("{}/health", runtime.base_url());
        let started = Instant::now();

        loop {
            if let Ok(Some(status)) = runtime.child.try_wait() {
                return Err(InferenceError::RuntimeExited(status.to_string()));
            }

            match client.get(&url).send() {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(Some(status)) = runtime.child.try_wait() {
                        return Err(InferenceError::RuntimeExited(status.to_string()));
                    }
                    return Ok(());
                }
                Ok(resp) => debug!(status = resp.status().as_u16(), "model still loading"),
                Err(e) => debug!("runtime not reachable yet: {e}"),
            }

            if started.elapsed() >= self.config.load_timeout {
                return Err(InferenceError::LoadTimeout(self.config.load_timeout.as_secs()));
            }
            std::thread::sleep(HEALTH_POLL_INTERVAL);
        }
    }

    /// Builds the JSON request body for the runtime's `/completion` endpoint.
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        serde_json::json!({
            "prompt": request.prompt,
            "n_predict": request.max_tokens,
            "temperature": request.temperature,
            "stop": request.stop,
            "stream": false,
        })
    }
}

impl CompletionBackend for LlamaServerBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, InferenceError> {
        if !self.config.model_path.is_file() {
            return Err(InferenceError::ModelNotFound(self.config.model_path.clone()));
        }
        let base_url = self.ensure_running()?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        debug!(
            prompt_bytes = request.prompt.len(),
            max_tokens = request.max_tokens,
            "sending completion request"
        );

        let response = client
            .post(format!("{base_url}/completion"))
            .json(&self.build_request_body(request))
            .send()
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .map_err(|e| InferenceError::ParseError(e.to_string()))?;

        json.get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| InferenceError::ParseError("Missing content in completion response".to_string()))
    }

    fn shutdown(&self) {
        if let Some(mut runtime) = self.lock_runtime().take() {
            info!(port = runtime.port, "stopping inference runtime");
            if let Err(e) = runtime.child.kill() {
                warn!("cannot stop inference runtime: {e}");
            }
            let _ = runtime.child.wait();
        }
    }
}

impl Drop for LlamaServerBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ChatMessage;

    fn backend_with_model(path: &str) -> LlamaServerBackend {
        LlamaServerBackend::new(InferenceConfig {
            model_path: path.into(),
            ..InferenceConfig::default()
        })
    }

    #[test]
    fn request_body_carries_generation_settings() {
        let backend = backend_with_model("model.gguf");
        let request = CompletionRequest::from_messages(&[ChatMessage::user("Hi")]);

        let body = backend.build_request_body(&request);

        assert_eq!(body["prompt"], "<|user|>\nHi</s>\n<|assistant|>\n");
        assert_eq!(body["n_predict"], 512);
        assert_eq!(body["stop"], serde_json::json!(["<|user|>", "</s>"]));
        assert_eq!(body["stream"], false);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn missing_model_fails_before_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("absent.gguf");
        let backend = backend_with_model(missing.to_str().unwrap());

        let err = backend.complete(&CompletionRequest::new("x")).unwrap_err();

        assert!(matches!(err, InferenceError::ModelNotFound(ref p) if *p == missing));
        assert!(backend.lock_runtime().is_none());
    }

    /// A listener on an ephemeral port that answers every request like a
    /// healthy runtime serving some other model.
    fn foreign_runtime() -> u16 {
        use std::io::{Read, Write};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for mut stream in listener.incoming().flatten() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let body = r#"{"status":"ok","content":"FOREIGN RUNTIME"}"#;
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
            }
        });
        port
    }

    /// A backend with a real model file whose runtime executable exits at
    /// once without binding anything.
    fn backend_with_dead_runtime(dir: &std::path::Path, port: Option<u16>) -> LlamaServerBackend {
        let model = dir.join("model.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        LlamaServerBackend::new(InferenceConfig {
            model_path: model,
            server_bin: "false".into(),
            port,
            load_timeout: Duration::from_secs(10),
        })
    }

    #[cfg(unix)]
    #[test]
    fn fixed_port_already_in_use_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let occupied = foreign_runtime();
        let backend = backend_with_dead_runtime(tmp.path(), Some(occupied));

        let result = backend.complete(&CompletionRequest::new("hi"));

        match result {
            Err(InferenceError::PortUnavailable { port, .. }) => assert_eq!(port, occupied),
            other => panic!("expected the occupied port to be refused, got {other:?}"),
        }
        assert!(backend.lock_runtime().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn runtime_that_exits_during_load_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let _neighbour = foreign_runtime();
        let backend = backend_with_dead_runtime(tmp.path(), None);

        let result = backend.complete(&CompletionRequest::new("hi"));

        assert!(
            matches!(result, Err(InferenceError::RuntimeExited(_))),
            "expected the dead runtime to be reported, got {result:?}"
        );
        assert!(backend.lock_runtime().is_none());
    }

    #[test]
    fn reserved_ports_are_free_and_honour_override() {
        let backend = backend_with_model("model.gguf");
        let port = backend.reserve_port().unwrap();
        assert_ne!(port, 0);
        TcpListener::bind(("127.0.0.1", port)).unwrap();

        let fixed = LlamaServerBackend::new(InferenceConfig {
            port: Some(port),
            ..InferenceConfig::default()
        });
        assert_eq!(fixed.reserve_port().unwrap(), port);
    }

    #[test]
    fn shutdown_without_runtime_is_a_no_op() {
        let backend = backend_with_model("model.gguf");
        backend.shutdown();
        backend.shutdown();
    }
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::store::HeaderMode;

/// Default knowledge-base document path.
const DEFAULT_KB_PATH: &str = "knowledge_base.txt";

/// Default quantized model weights path.
pub const DEFAULT_MODEL_PATH: &str = "models/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf";

/// Default llama.cpp server executable.
const DEFAULT_LLAMA_SERVER_BIN: &str = "llama-server";

/// Default wait for the runtime to finish loading weights (120 seconds).
const DEFAULT_MODEL_LOAD_TIMEOUT_SECS: u64 = 120;

/// Which set of tools, resources and prompts the server registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    KnowledgeBase,
    Llm,
    Demo,
}

impl Profile {
    /// Name reported in `serverInfo`.
    pub fn server_name(&self) -> &'static str {
        match self {
            Profile::KnowledgeBase => "kb-mcp-server/knowledge-base",
            Profile::Llm => "kb-mcp-server/llm",
            Profile::Demo => "kb-mcp-server/demo",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::KnowledgeBase => write!(f, "knowledge-base"),
            Profile::Llm => write!(f, "llm"),
            Profile::Demo => write!(f, "demo"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "knowledge-base" | "kb" => Ok(Profile::KnowledgeBase),
            "llm" => Ok(Profile::Llm),
            "demo" => Ok(Profile::Demo),
            other => Err(format!(
                "Unknown server profile: '{other}'. Expected one of: knowledge-base, llm, demo"
            )),
        }
    }
}

/// Settings for the llama.cpp runtime backing the inference adapter.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub model_path: PathBuf,
    pub server_bin: PathBuf,
    /// Fixed runtime port on 127.0.0.1. `None` picks a free port for every
    /// runtime started.
    pub port: Option<u16>,
    pub load_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            server_bin: PathBuf::from(DEFAULT_LLAMA_SERVER_BIN),
            port: None,
            load_timeout: Duration::from_secs(DEFAULT_MODEL_LOAD_TIMEOUT_SECS),
        }
    }
}

impl InferenceConfig {
    /// Load inference settings from environment.
    ///
    /// - `KB_MODEL_PATH` (optional): quantized weights file
    /// - `KB_LLAMA_SERVER_BIN` (optional, default `llama-server`): runtime executable
    /// - `KB_LLAMA_PORT` (optional, default a free port): fixed runtime port on 127.0.0.1
    /// - `KB_MODEL_LOAD_TIMEOUT_SECS` (optional, default 120): readiness wait
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let model_path = std::env::var("KB_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);

        let server_bin = std::env::var("KB_LLAMA_SERVER_BIN")
            .map(PathBuf::from)
            .unwrap_or(defaults.server_bin);

        let port = match std::env::var("KB_LLAMA_PORT") {
            Ok(val) => match val.parse::<u16>() {
                Ok(0) | Err(_) => return Err("KB_LLAMA_PORT must be a port number (1-65535)".to_string()),
                Ok(port) => Some(port),
            },
            Err(_) => defaults.port,
        };

        let load_timeout = match std::env::var("KB_MODEL_LOAD_TIMEOUT_SECS") {
            Ok(val) => Duration::from_secs(val.parse::<u64>().map_err(|_| {
                "KB_MODEL_LOAD_TIMEOUT_SECS must be a positive integer".to_string()
            })?),
            Err(_) => defaults.load_timeout,
        };

        Ok(Self {
            model_path,
            server_bin,
            port,
            load_timeout,
        })
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub profile: Profile,
    pub kb_path: PathBuf,
    pub header_mode: HeaderMode,
    pub inference: InferenceConfig,
}

impl ServerConfig {
    /// Load configuration from environment.
    ///
    /// - `KB_SERVER_PROFILE` (optional, default `knowledge-base`)
    /// - `KB_PATH` (optional, default `knowledge_base.txt`): document file
    /// - `KB_HEADER_MODE` (optional, default `strict`): `strict` or `legacy`
    ///
    /// Inference settings are read by [`InferenceConfig::from_env`].
    pub fn from_env() -> Result<Self, String> {
        let profile = match std::env::var("KB_SERVER_PROFILE") {
            Ok(val) => val.parse::<Profile>()?,
            Err(_) => Profile::KnowledgeBase,
        };

        let kb_path = std::env::var("KB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_KB_PATH));

        let header_mode = match std::env::var("KB_HEADER_MODE") {
            Ok(val) => val.parse::<HeaderMode>()?,
            Err(_) => HeaderMode::Strict,
        };

        Ok(Self {
            profile,
            kb_path,
            header_mode,
            inference: InferenceConfig::from_env()?,
        })
    }
}

//! Runtime settings: env-first, overridable by flags.

use std::path::{Path, PathBuf};

/// Per-platform data directory: `~/.kuttai` on Linux, the platform data dir elsewhere.
pub fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .unwrap_or_else(|| home.join("AppData").join("Local"))
            .join("KuttAI")
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .unwrap_or_else(|| home.join("Library").join("Application Support"))
            .join("KuttAI")
    } else {
        home.join(".kuttai")
    }
}

/// Opt-in `KEY=VALUE` env-file loader.
///
/// - sets vars only if not already set in the process environment
/// - skips blank lines and `#` comments
/// - does not log values
///
/// Returns the number of variables set.
pub fn load_env_file(path: &Path) -> usize {
    let Ok(txt) = std::fs::read_to_string(path) else {
        return 0;
    };
    let mut n = 0;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
            n += 1;
        }
    }
    n
}

/// Ollama model name a downloaded GGUF is registered under by `ollama create`.
pub const IMPORTED_MODEL_NAME: &str = "kuttai";

/// Ollama Modelfile that serves `gguf` with the chat session's default sampling.
pub fn modelfile_contents(gguf: &Path) -> String {
    let o = kuttai_core::SamplingOptions::default();
    format!(
        "FROM {}\nPARAMETER temperature {}\nPARAMETER top_p {}\nPARAMETER num_predict {}\n",
        gguf.display(),
        o.temperature,
        o.top_p,
        o.max_tokens
    )
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub llm_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ollama_base_url: kuttai_local::ollama::DEFAULT_BASE_URL.to_string(),
            ollama_model: kuttai_local::ollama::DEFAULT_MODEL.to_string(),
            llm_timeout_ms: kuttai_local::ollama::DEFAULT_LLM_TIMEOUT_MS,
            fetch_timeout_ms: kuttai_local::DEFAULT_FETCH_TIMEOUT_MS,
        }
    }
}

impl Settings {
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("userdata.json")
    }

    pub fn modelfile_path(&self) -> PathBuf {
        self.models_dir().join("Modelfile")
    }

    /// Write the Modelfile for `gguf` next to it. Chat only reads the file after it has been
    /// imported into Ollama and selected with `KUTTAI_OLLAMA_MODEL`.
    pub fn write_modelfile(&self, gguf: &Path) -> std::io::Result<PathBuf> {
        let path = self.modelfile_path();
        std::fs::create_dir_all(self.models_dir())?;
        std::fs::write(&path, modelfile_contents(gguf))?;
        Ok(path)
    }

    pub fn import_command(&self) -> String {
        format!(
            "ollama create {IMPORTED_MODEL_NAME} -f {}",
            self.modelfile_path().display()
        )
    }

    /// Whether chat completions are served by the imported GGUF rather than a stock model.
    pub fn uses_imported_model(&self) -> bool {
        self.ollama_model == IMPORTED_MODEL_NAME
            || self
                .ollama_model
                .starts_with(&format!("{IMPORTED_MODEL_NAME}:"))
    }

    /// The model file to use: a known name first, else the first `*.gguf` (by name).
    pub fn find_model_file(&self) -> Option<PathBuf> {
        let rd = std::fs::read_dir(self.models_dir()).ok()?;
        let mut ggufs: Vec<PathBuf> = rd
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "gguf"))
            .collect();
        ggufs.sort();
        let preferred = ggufs.iter().find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("ClinIQ-Gemma-2B") || n.contains("hf_mradermacher"))
        });
        preferred.or_else(|| ggufs.first()).cloned()
    }
}

//! Moteur de rendu externe
//!
//! Le rendu d'un programme est délégué à un exécutable opaque (Pixlet) :
//! `pixlet render <app.star> key=value... --gif -o <out.gif>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use bytstore::is_valid_id;

use crate::error::RenderError;
use crate::key::CacheKey;

/// Demande de rendu d'un programme
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub key: CacheKey,
    pub program_id: String,
    pub source: String,
    /// Arguments `key=value` déjà validés
    pub args: Vec<String>,
}

/// Moteur de rendu : transforme un programme en GIF
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> std::result::Result<Vec<u8>, RenderError>;
}

/// Valide un programme et sa configuration avant l'invocation du moteur
///
/// Renvoie les arguments `key=value` à transmettre.
pub fn validate_program(
    program_id: &str,
    source: &str,
    config: &BTreeMap<String, Value>,
) -> std::result::Result<Vec<String>, RenderError> {
    if !is_valid_id(program_id) {
        return Err(RenderError::InvalidProgram(format!(
            "{:?} is not a .star file name",
            program_id
        )));
    }
    if source.trim().is_empty() {
        return Err(RenderError::InvalidProgram("empty source".to_string()));
    }
    config
        .iter()
        .map(|(key, value)| config_arg(key, value))
        .collect()
}

fn config_arg(key: &str, value: &Value) -> std::result::Result<String, RenderError> {
    let invalid_key = key.is_empty()
        || key.starts_with('-')
        || key.chars().any(|c| c == '=' || c.is_whitespace() || c.is_control());
    if invalid_key {
        return Err(RenderError::InvalidProgram(format!(
            "config key {:?} cannot be passed as key=value",
            key
        )));
    }

    let rendered = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    if rendered.contains('\0') {
        return Err(RenderError::InvalidProgram(format!(
            "config value for {:?} contains a NUL byte",
            key
        )));
    }
    Ok(format!("{}={}", key, rendered))
}

/// Rendu via l'exécutable `pixlet`
///
/// Le source est écrit dans un répertoire de travail propre à la clé, le
/// processus est lancé avec `kill_on_drop` : abandonner le futur (expiration
/// du délai) tue le processus.
pub struct PixletRenderer {
    command: String,
    work_dir: PathBuf,
}

impl PixletRenderer {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
        }
    }

    async fn run(
        &self,
        request: &RenderRequest,
        dir: &Path,
    ) -> std::result::Result<Vec<u8>, RenderError> {
        let storage = |e: std::io::Error| RenderError::Storage(e.to_string());

        fs::create_dir_all(dir).await.map_err(storage)?;
        let app_path = dir.join(&request.program_id);
        let out_path = dir.join("out.gif");
        fs::write(&app_path, request.source.as_bytes())
            .await
            .map_err(storage)?;

        debug!(
            command = %self.command,
            program = %request.program_id,
            args = ?request.args,
            "Executing renderer"
        );

        let output = Command::new(&self.command)
            .arg("render")
            .arg(&app_path)
            .args(&request.args)
            .arg("--gif")
            .arg("-o")
            .arg(&out_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderError::Process(format!("cannot start {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Process(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        fs::read(&out_path)
            .await
            .map_err(|e| RenderError::Process(format!("no output produced: {}", e)))
    }
}

#[async_trait]
impl Renderer for PixletRenderer {
    async fn render(&self, request: &RenderRequest) -> std::result::Result<Vec<u8>, RenderError> {
        let dir = self.work_dir.join(request.key.as_str());
        let result = self.run(request, &dir).await;
        let _ = fs::remove_dir_all(&dir).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_becomes_arguments() {
        let mut config = BTreeMap::new();
        config.insert("city".to_string(), json!("Lyon"));
        config.insert("celsius".to_string(), json!(true));
        config.insert("zoom".to_string(), json!(3));

        let args = validate_program("weather.star", "main()", &config).unwrap();
        assert_eq!(args, vec!["celsius=true", "city=Lyon", "zoom=3"]);
    }

    #[test]
    fn test_invalid_programs_are_rejected() {
        let empty = BTreeMap::new();
        assert!(matches!(
            validate_program("weather.py", "main()", &empty),
            Err(RenderError::InvalidProgram(_))
        ));
        assert!(matches!(
            validate_program("weather.star", "   ", &empty),
            Err(RenderError::InvalidProgram(_))
        ));

        let mut config = BTreeMap::new();
        config.insert("a=b".to_string(), json!("x"));
        assert!(matches!(
            validate_program("weather.star", "main()", &config),
            Err(RenderError::InvalidProgram(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PixletRenderer::new("/nonexistent/pixlet-binary", dir.path());
        let request = RenderRequest {
            key: CacheKey::from("k".to_string()),
            program_id: "a.star".to_string(),
            source: "main()".to_string(),
            args: Vec::new(),
        };
        assert!(matches!(
            renderer.render(&request).await,
            Err(RenderError::Process(_))
        ));
        assert!(!dir.path().join("k").exists());
    }
}

use crate::config::Settings;
use crate::record::RecordDefinition;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CompileError {
    /// Compiler ran and rejected the definition; diagnostics are verbatim.
    #[error("compiler reported errors:\n{0}")]
    Diagnostics(String),
    #[error("failed to write record source {}: {source}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch compiler: {0}")]
    Toolchain(#[from] std::io::Error),
    #[error("build artifact unusable: {0}")]
    Artifact(String),
}

/// A compiled record definition ready for a creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `<file>:<contract>` as the toolchain addresses it.
    pub contract_path: String,
    pub bytecode: String,
    /// BLAKE3 of the bytecode.
    pub fingerprint: String,
}

impl Artifact {
    pub fn new(contract_path: impl Into<String>, bytecode: impl Into<String>) -> Self {
        let bytecode = bytecode.into();
        let fingerprint = blake3::hash(bytecode.as_bytes()).to_hex().to_string();
        Self {
            contract_path: contract_path.into(),
            bytecode,
            fingerprint,
        }
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, definition: &RecordDefinition) -> Result<Artifact, CompileError>;
}

#[derive(Deserialize)]
struct ForgeArtifactFile {
    bytecode: ForgeBytecode,
}

#[derive(Deserialize)]
struct ForgeBytecode {
    object: String,
}

/// Builds the record with `forge build` inside a Foundry project.
pub struct ForgeCompiler {
    settings: Settings,
}

impl ForgeCompiler {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn source_path(&self) -> PathBuf {
        self.settings.project_dir.join(&self.settings.contract_file)
    }

    fn artifact_path(&self, contract_name: &str) -> PathBuf {
        let file_name = self
            .settings
            .contract_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.sol", contract_name)));
        self.settings
            .project_dir
            .join("out")
            .join(file_name)
            .join(format!("{}.json", contract_name))
    }

    async fn write_source(&self, definition: &RecordDefinition) -> Result<(), CompileError> {
        let path = self.source_path();
        let written = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, definition.render_source()).await
        };
        written.await.map_err(|source| CompileError::Source { path: path.clone(), source })?;
        debug!(path = %path.display(), "wrote record source");
        Ok(())
    }

    async fn read_artifact(&self, contract_name: &str) -> Result<String, CompileError> {
        let path = self.artifact_path(contract_name);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| CompileError::Artifact(format!("{}: {}", path.display(), e)))?;
        let parsed: ForgeArtifactFile = serde_json::from_slice(&raw)
            .map_err(|e| CompileError::Artifact(format!("{}: {}", path.display(), e)))?;

        let object = parsed.bytecode.object;
        if object.trim_start_matches("0x").is_empty() {
            return Err(CompileError::Artifact(format!("{}: empty bytecode", path.display())));
        }
        Ok(object)
    }
}

#[async_trait]
impl Compiler for ForgeCompiler {
    async fn compile(&self, definition: &RecordDefinition) -> Result<Artifact, CompileError> {
        self.write_source(definition).await?;

        info!(forge = %self.settings.forge_bin.display(), "running forge build");
        let output = Command::new(&self.settings.forge_bin)
            .arg("build")
            .current_dir(&self.settings.project_dir)
            .output()
            .await?;

        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                if !diagnostics.is_empty() && !diagnostics.ends_with('\n') {
                    diagnostics.push('\n');
                }
                diagnostics.push_str(&stdout);
            }
            return Err(CompileError::Diagnostics(diagnostics));
        }

        let bytecode = self.read_artifact(definition.contract_name()).await?;
        let artifact = Artifact::new(self.settings.contract_path(definition.contract_name()), bytecode);
        info!(fingerprint = %artifact.fingerprint, "record compiled");
        Ok(artifact)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Stand-in for `forge` that runs the given shell body.
    fn fake_forge(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-forge");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn settings_for(dir: &Path, forge_bin: PathBuf) -> Settings {
        Settings {
            project_dir: dir.to_path_buf(),
            forge_bin,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn successful_build_yields_fingerprinted_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let forge = fake_forge(
            dir.path(),
            "mkdir -p out/ProductRecord.sol\n\
             echo '{\"bytecode\":{\"object\":\"0x6080604052\"}}' > out/ProductRecord.sol/ProductRecord.json",
        );
        let compiler = ForgeCompiler::new(settings_for(dir.path(), forge));

        let artifact = compiler.compile(&RecordDefinition::new()).await.unwrap();
        assert_eq!(artifact.contract_path, "src/ProductRecord.sol:ProductRecord");
        assert_eq!(artifact.bytecode, "0x6080604052");
        assert_eq!(artifact.fingerprint, blake3::hash(b"0x6080604052").to_hex().to_string());

        let written = std::fs::read_to_string(dir.path().join("src/ProductRecord.sol")).unwrap();
        assert_eq!(written, RecordDefinition::new().render_source());
    }

    #[tokio::test]
    async fn compiling_twice_gives_the_same_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let forge = fake_forge(
            dir.path(),
            "mkdir -p out/ProductRecord.sol\n\
             echo '{\"bytecode\":{\"object\":\"0x60aa\"}}' > out/ProductRecord.sol/ProductRecord.json",
        );
        let compiler = ForgeCompiler::new(settings_for(dir.path(), forge));

        let first = compiler.compile(&RecordDefinition::new()).await.unwrap();
        let second = compiler.compile(&RecordDefinition::new()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_build_carries_diagnostics_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let forge = fake_forge(
            dir.path(),
            "echo 'Error (2314): Expected ; but got }' >&2\nexit 1",
        );
        let compiler = ForgeCompiler::new(settings_for(dir.path(), forge));

        match compiler.compile(&RecordDefinition::new()).await {
            Err(CompileError::Diagnostics(text)) => {
                assert!(text.contains("Error (2314): Expected ; but got }"));
            }
            other => panic!("expected diagnostics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_toolchain_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = ForgeCompiler::new(settings_for(dir.path(), dir.path().join("no-such-forge")));

        assert!(matches!(
            compiler.compile(&RecordDefinition::new()).await,
            Err(CompileError::Toolchain(_))
        ));
    }

    #[tokio::test]
    async fn unwritable_source_is_not_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let forge = fake_forge(dir.path(), "touch ran\nexit 0");
        // A plain file where the source directory belongs.
        std::fs::write(dir.path().join("src"), "").unwrap();
        let compiler = ForgeCompiler::new(settings_for(dir.path(), forge));

        match compiler.compile(&RecordDefinition::new()).await {
            Err(CompileError::Source { path, .. }) => {
                assert_eq!(path, dir.path().join("src/ProductRecord.sol"));
            }
            other => panic!("expected source write failure, got {:?}", other),
        }
        assert!(!dir.path().join("ran").exists());
    }

    #[tokio::test]
    async fn missing_build_output_is_an_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let forge = fake_forge(dir.path(), "exit 0");
        let compiler = ForgeCompiler::new(settings_for(dir.path(), forge));

        assert!(matches!(
            compiler.compile(&RecordDefinition::new()).await,
            Err(CompileError::Artifact(_))
        ));
    }
}

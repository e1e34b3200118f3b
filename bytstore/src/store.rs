//! Dépôt de programmes côté édition
//!
//! Les programmes sont des fichiers `*.star` dans un répertoire, les
//! métadonnées un document `program_metadata.json` à côté. Toutes les
//! écritures passent par un fichier temporaire renommé, si bien qu'un
//! lecteur ne voit jamais de fichier partiellement écrit.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::metadata::{MetadataMap, ProgramMetadata};
use crate::program::{is_valid_id, validate_id, Program};
use crate::snapshot::{Fingerprint, ProgramSet};

/// Nom du document de métadonnées
pub const METADATA_FILE: &str = "program_metadata.json";

/// Dépôt de programmes adossé à un répertoire
pub struct ProgramStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ProgramStore {
    /// Ouvre le dépôt, en créant le répertoire si nécessaire
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        info!(directory = %dir.display(), "Program store opened");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Identifiants des programmes présents, triés
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_valid_id(&name) && entry.file_type().await?.is_file() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Lit un programme et ses métadonnées effectives
    pub async fn get(&self, id: &str) -> Result<Option<(Program, ProgramMetadata)>> {
        validate_id(id)?;
        let path = self.dir.join(id);
        let source = match fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata = self.metadata().await?.get_or_default(id);
        Ok(Some((Program::new(id, source), metadata)))
    }

    /// Lit le document de métadonnées (vide s'il n'existe pas)
    pub async fn metadata(&self) -> Result<MetadataMap> {
        match fs::read(self.dir.join(METADATA_FILE)).await {
            Ok(data) => MetadataMap::from_json(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No metadata document, using defaults");
                Ok(MetadataMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Instantané complet du dépôt
    pub async fn snapshot(&self) -> Result<ProgramSet> {
        let mut programs = Vec::new();
        for id in self.list_ids().await? {
            match fs::read_to_string(self.dir.join(&id)).await {
                Ok(source) => programs.push(Program::new(id, source)),
                // supprimé entre le listing et la lecture
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ProgramSet::new(programs, self.metadata().await?))
    }

    /// Empreinte courante du dépôt
    pub async fn fingerprint(&self) -> Result<Fingerprint> {
        Ok(self.snapshot().await?.fingerprint())
    }

    /// Crée ou remplace un programme
    pub async fn put_program(&self, id: &str, source: &str) -> Result<Program> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.dir.join(id), source.as_bytes()).await?;
        let program = Program::new(id, source);
        info!(program = %id, hash = %program.hash, "Program saved");
        Ok(program)
    }

    /// Supprime un programme et ses métadonnées
    pub async fn delete_program(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.dir.join(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ProgramNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        let mut metadata = self.metadata().await?;
        if metadata.remove(id).is_some() {
            self.write_metadata(&metadata).await?;
        }
        info!(program = %id, "Program deleted");
        Ok(())
    }

    /// Remplace les métadonnées d'un programme
    pub async fn update_metadata(&self, id: &str, update: ProgramMetadata) -> Result<()> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        let _guard = self.write_lock.lock().await;
        let mut metadata = self.metadata().await?;
        metadata.insert(id, update)?;
        self.write_metadata(&metadata).await?;
        info!(program = %id, "Metadata updated");
        Ok(())
    }

    async fn write_metadata(&self, metadata: &MetadataMap) -> Result<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&self.dir.join(METADATA_FILE), &json).await
    }
}

/// Écrit via un fichier temporaire puis renomme
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

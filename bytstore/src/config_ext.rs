//! Extension de bytconfig pour le dépôt et l'état local

use std::path::PathBuf;

use crate::{Result, StoreError};

/// Trait d'extension pour bytconfig::Config
pub trait StoreConfigExt {
    /// Répertoire des programmes `.star` (côté édition)
    fn store_dir(&self) -> Result<PathBuf>;

    /// Chemin de la base SQLite de l'état local du nœud
    fn node_db_path(&self) -> Result<PathBuf>;
}

impl StoreConfigExt for bytconfig::Config {
    fn store_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["store", "directory"], "star_programs")
            .map(PathBuf::from)
            .map_err(|e| StoreError::PersistenceError(e.to_string()))
    }

    fn node_db_path(&self) -> Result<PathBuf> {
        // get_managed_dir crée le répertoire du nœud s'il n'existe pas
        let node_dir = self
            .get_managed_dir(&["node", "directory"], "node")
            .map_err(|e| StoreError::PersistenceError(e.to_string()))?;
        Ok(PathBuf::from(node_dir).join("node.db"))
    }
}

/**
 * LAYOUT STORE - Persistance du layout opérateur
 *
 * RÔLE : Lit/écrit le document de layout (positions, tailles de groupes,
 * liens) auprès du collaborateur de persistance. Une seule entrée durable
 * dans tout le système : tout le reste est reconstruit à chaque poll.
 *
 * FONCTIONNEMENT :
 * - Trait LayoutStore pour découpler moteur et support de stockage
 * - FileLayoutStore : un document JSON unique sur disque, remplacé en bloc
 * - Document absent => pas de layout sauvegardé, jamais une erreur
 */

use crate::graph::SavedLayout;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LayoutStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed layout document: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait LayoutStore: Send + Sync {
    /// Rend le document sauvegardé, ou None si rien n'a jamais été sauvegardé.
    async fn read(&self) -> Result<Option<SavedLayout>, LayoutStoreError>;
    /// Remplace le document en bloc.
    async fn write(&self, layout: &SavedLayout) -> Result<(), LayoutStoreError>;
    /// Efface le document ; idempotent si rien n'existe.
    async fn clear(&self) -> Result<(), LayoutStoreError>;
}

pub struct FileLayoutStore {
    path: PathBuf,
}

impl FileLayoutStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LayoutStore for FileLayoutStore {
    async fn read(&self) -> Result<Option<SavedLayout>, LayoutStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let layout: SavedLayout = serde_json::from_str(&content)?;
        Ok(Some(layout))
    }

    async fn write(&self, layout: &SavedLayout) -> Result<(), LayoutStoreError> {
        let json = serde_json::to_string_pretty(layout)?;
        tokio::fs::write(&self.path, json).await?;
        println!("[layout] document écrit ({} noeuds)", layout.nodes.len());
        Ok(())
    }

    async fn clear(&self) -> Result<(), LayoutStoreError> {
        if self.path.exists() {
            tokio::fs::remove_file(&self.path).await?;
            println!("[layout] document effacé");
        }
        Ok(())
    }
}

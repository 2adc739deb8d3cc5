//! Resolves the on-disk layout under the working directory, commonly `.dmm/`.

use std::path::{Path, PathBuf};

pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataDir { root: root.into() }
    }

    fn index(&self, name: &str) -> PathBuf {
        self.root.join("index").join(name)
    }

    pub fn memory_root(&self) -> PathBuf {
        self.root.join("memory")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    pub fn embeddings_db(&self) -> PathBuf {
        self.index("embeddings.sqlite")
    }

    /// `GraphStore` is SQLite-backed, so the "directory" in the data
    /// layout holds a single database file.
    pub fn knowledge_graph_db(&self) -> PathBuf {
        self.index("knowledge.graph").join("graph.sqlite")
    }

    pub fn ensure_knowledge_graph_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.index("knowledge.graph"))
    }

    pub fn conflicts_db(&self) -> PathBuf {
        self.index("conflicts.sqlite")
    }

    pub fn review_queue_db(&self) -> PathBuf {
        self.index("review_queue.sqlite")
    }

    pub fn usage_db(&self) -> PathBuf {
        self.index("usage.sqlite")
    }

    pub fn agentos_db(&self) -> PathBuf {
        self.index("agentos.sqlite")
    }

    pub fn tasks_db(&self) -> PathBuf {
        self.index("tasks.sqlite")
    }

    pub fn ensure_index_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.root.join("index"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::ElementType;

/// Local portfolio laid out under a temporary directory.
pub struct PortfolioFixture {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

impl Default for PortfolioFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("portfolio");
        std::fs::create_dir_all(&root).expect("Failed to create portfolio root");

        println!("[FIXTURE] Created portfolio: {:?}", root);

        Self { temp_dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a raw file relative to the portfolio root.
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.root.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        println!(
            "[FIXTURE] Created file: {:?} ({} bytes)",
            full_path,
            content.len()
        );
        full_path
    }

    /// Write `<type_dir>/<name>.md` with a front-matter header.
    pub fn create_element(
        &self,
        element_type: ElementType,
        name: &str,
        version: &str,
        description: &str,
        triggers: &[&str],
    ) -> PathBuf {
        self.create_file(
            &format!("{}/{name}.md", element_type.dir_name()),
            &element_markdown(name, version, description, triggers),
        )
    }
}

/// Markdown body with a YAML front-matter header.
pub fn element_markdown(name: &str, version: &str, description: &str, triggers: &[&str]) -> String {
    let mut header = format!("---\nname: {name}\nversion: \"{version}\"\ndescription: {description}\n");
    if !triggers.is_empty() {
        header.push_str(&format!("triggers: [{}]\n", triggers.join(", ")));
    }
    header.push_str("---\n\n# Body\n\nInstructions go here.\n");
    header
}

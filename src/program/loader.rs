//! Loading program resource files from the shader directory

use super::compile::{compile, MorphProgram, MORPH_PRELUDE};
use super::parser::parse_program_file;
use crate::error::{MorphError, Result};
use std::path::{Path, PathBuf};

/// Reads, parses and compiles program files from one directory
#[derive(Debug, Clone)]
pub struct ProgramLoader {
    pub shader_dir: PathBuf,
    pub prelude: String,
}

impl ProgramLoader {
    pub fn new(shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_dir: shader_dir.into(),
            prelude: MORPH_PRELUDE.to_string(),
        }
    }

    /// Program name for a file: its stem, so `growth.wgsl` registers as `growth`
    pub fn program_name(file: &str) -> String {
        Path::new(file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string())
    }

    pub fn path_of(&self, file: &str) -> PathBuf {
        self.shader_dir.join(file)
    }

    pub fn load(&self, file: &str) -> Result<MorphProgram> {
        let path = self.path_of(file);
        let (source, user_unifs) = parse_program_file(&path)?;
        let program = compile(&Self::program_name(file), &source, user_unifs, &self.prelude)?;
        log::info!(
            "Loaded program '{}' from {:?} ({} user uniforms)",
            program.name,
            path,
            program.user_unifs.len()
        );
        Ok(program)
    }

    /// Loads every file, skipping the ones that fail
    ///
    /// Failures are logged; it is only an error when nothing loads at all.
    pub fn load_all(&self, files: &[String]) -> Result<Vec<MorphProgram>> {
        let mut programs = Vec::with_capacity(files.len());
        for file in files {
            match self.load(file) {
                Ok(program) => programs.push(program),
                Err(e) => log::error!("Skipping program {:?}: {}", file, e),
            }
        }
        if programs.is_empty() {
            return Err(MorphError::NoPrograms);
        }
        Ok(programs)
    }
}

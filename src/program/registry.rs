//! Ordered program registry with an active selection

use super::user_unif::UserUnif;
use super::Program;
use crate::error::{MorphError, Result};

/// Registered programs plus the index of the one the driver runs
///
/// Programs are kept in registration order. Replacing a program by name keeps
/// its position, so a reload never moves the active selection.
#[derive(Debug)]
pub struct ProgramRegistry<P> {
    programs: Vec<P>,
    active: usize,
}

impl<P> Default for ProgramRegistry<P> {
    fn default() -> Self {
        Self {
            programs: Vec::new(),
            active: 0,
        }
    }
}

impl<P: Program> ProgramRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.programs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.programs.iter().map(|p| p.name()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.programs.iter().position(|p| p.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&P> {
        self.programs.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut P> {
        self.programs.iter_mut().find(|p| p.name() == name)
    }

    /// Inserts a program, overwriting in place if the name is already
    /// registered; returns its index
    pub fn register(&mut self, program: P) -> usize {
        match self.position(program.name()) {
            Some(index) => {
                self.programs[index] = program;
                index
            }
            None => {
                self.programs.push(program);
                self.programs.len() - 1
            }
        }
    }

    /// Loads a fresh revision of `name` and swaps it in
    ///
    /// On success the new program takes the old one's slot and inherits the
    /// current values of uniforms whose name and width are unchanged. On
    /// failure the registered program is left exactly as it was.
    pub fn reload<F>(&mut self, name: &str, load: F) -> Result<usize>
    where
        F: FnOnce() -> Result<P>,
    {
        let mut program = load()?;
        if let Some(previous) = self.get(name) {
            UserUnif::carry_over(previous.user_unifs(), program.user_unifs_mut());
        }
        Ok(self.register(program))
    }

    /// Replaces the whole set, keeping the active index in range
    pub fn replace_all(&mut self, programs: Vec<P>) {
        self.programs = programs;
        self.clamp_active();
    }

    pub fn remove(&mut self, name: &str) -> Option<P> {
        let index = self.position(name)?;
        let program = self.programs.remove(index);
        if index < self.active {
            self.active -= 1;
        }
        self.clamp_active();
        Some(program)
    }

    fn clamp_active(&mut self) {
        self.active = self.active.min(self.programs.len().saturating_sub(1));
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn set_active(&mut self, index: usize) -> Result<()> {
        if index >= self.programs.len() {
            return Err(MorphError::IndexOutOfBounds {
                index,
                len: self.programs.len(),
            });
        }
        self.active = index;
        Ok(())
    }

    pub fn set_active_by_name(&mut self, name: &str) -> Result<()> {
        let index = self
            .position(name)
            .ok_or_else(|| MorphError::UnknownProgram(name.to_string()))?;
        self.active = index;
        Ok(())
    }

    pub fn active(&self) -> Result<&P> {
        self.programs.get(self.active).ok_or(MorphError::NoPrograms)
    }

    pub fn active_mut(&mut self) -> Result<&mut P> {
        self.programs.get_mut(self.active).ok_or(MorphError::NoPrograms)
    }
}

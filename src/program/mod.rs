//! Program registry - parsing, compiling and hot-swapping simulation programs
//!
//! A simulation program is a per-node step with a fixed calling contract. On
//! the GPU it is a WGSL compute entry point compiled against the binding
//! prelude; on the host it is a [`crate::sim::NodeStep`]. Both expose their
//! user uniforms through [`Program`], which is all the registry and the
//! driver need.

pub mod compile;
pub mod loader;
pub mod parser;
pub mod registry;
pub mod user_unif;

pub use compile::{compile, BindingSlot, MorphProgram, ProgramHandles, MORPH_PRELUDE};
pub use loader::ProgramLoader;
pub use parser::{parse_program_file, parse_program_text};
pub use registry::ProgramRegistry;
pub use user_unif::UserUnif;

/// What the registry and the simulation driver know about a program
pub trait Program {
    fn name(&self) -> &str;

    fn user_unifs(&self) -> &[UserUnif];

    fn user_unifs_mut(&mut self) -> &mut [UserUnif];

    fn user_unif(&self, name: &str) -> Option<&UserUnif> {
        self.user_unifs().iter().find(|u| u.name == name)
    }

    fn user_unif_mut(&mut self, name: &str) -> Option<&mut UserUnif> {
        self.user_unifs_mut().iter_mut().find(|u| u.name == name)
    }

    /// Resets every user uniform to its default value
    fn reset_user_unifs(&mut self) {
        for unif in self.user_unifs_mut() {
            unif.reset();
        }
    }
}

//! User-tunable program parameters

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// A named, range-bounded parameter exposed by a program
///
/// Every user uniform is uploaded as a full `vec4<f32>`; only the first
/// `num_comps` components are meaningful and the rest stay at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUnif {
    pub name: String,
    /// Number of meaningful components, 1 to 4
    pub num_comps: usize,
    pub min: f32,
    pub max: f32,
    /// Step size for interactive drag editing
    pub drag_speed: f32,
    pub default_value: Vec4,
    pub current_value: Vec4,
}

impl UserUnif {
    /// Creates a uniform whose current value starts at its default
    pub fn new(
        name: impl Into<String>,
        num_comps: usize,
        min: f32,
        max: f32,
        drag_speed: f32,
        default_value: Vec4,
    ) -> Self {
        Self {
            name: name.into(),
            num_comps,
            min,
            max,
            drag_speed,
            default_value,
            current_value: default_value,
        }
    }

    pub fn reset(&mut self) {
        self.current_value = self.default_value;
    }

    /// The meaningful components of the current value
    pub fn value(&self) -> &[f32] {
        &self.current_value.as_ref()[..self.num_comps]
    }

    /// Sets the leading components, clamped to `[min, max]`
    ///
    /// Values beyond `num_comps` are ignored; components not given keep
    /// their current value.
    pub fn set_value(&mut self, values: &[f32]) {
        for (i, v) in values.iter().take(self.num_comps).enumerate() {
            self.current_value[i] = v.max(self.min).min(self.max);
        }
    }

    /// Copies current values from `previous` into `next` for every uniform
    /// whose name and width did not change
    pub fn carry_over(previous: &[UserUnif], next: &mut [UserUnif]) {
        for unif in next.iter_mut() {
            if let Some(old) = previous
                .iter()
                .find(|old| old.name == unif.name && old.num_comps == unif.num_comps)
            {
                unif.current_value = old.current_value;
            }
        }
    }

    /// The current value in its uniform buffer layout
    pub fn uniform_data(&self) -> [f32; 4] {
        self.current_value.to_array()
    }
}

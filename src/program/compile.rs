//! Program compilation and handle resolution
//!
//! A program's source is appended to the fixed binding prelude, parsed and
//! validated with naga, then reflected: every contract name is looked up as
//! a global of the `main` compute entry point. A handle only resolves when
//! the entry point actually uses the global.
//!
//! Every bound global the entry point uses must be something the driver can
//! bind: a prelude global or a declared `vec4<f32>` user uniform, in a group
//! below `MAX_BIND_GROUPS`, with no two sharing a slot.

use super::user_unif::UserUnif;
use super::Program;
use crate::constants::contract::{
    ENTRY_POINT, ITER_NUM_NAME, MAX_BIND_GROUPS, NUM_NODES_NAME, OUTPUT_CHANNEL_NAMES,
    SOURCE_VIEW_NAMES,
};
use crate::constants::field;
use crate::error::{MorphError, Result};
use naga::valid::{Capabilities, FunctionInfo, ValidationFlags, Validator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed bindings every simulation program is compiled against
pub const MORPH_PRELUDE: &str = include_str!("shaders/morph_prelude.wgsl");

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Resolved location of a global in the program's bind groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramHandles {
    /// Random-access views of the source buffer, in field order
    pub source_views: [Option<BindingSlot>; field::COUNT],
    /// Output channels into the destination buffer, in field order
    pub output_channels: [Option<BindingSlot>; field::COUNT],
    pub iter_num: Option<BindingSlot>,
    pub num_nodes: Option<BindingSlot>,
    /// One entry per declared user uniform, in declaration order
    pub user_unifs: Vec<Option<BindingSlot>>,
}

impl ProgramHandles {
    /// Names of every contract global that did not resolve
    pub fn unresolved_names(&self, user_unifs: &[UserUnif]) -> Vec<String> {
        let mut names = Vec::new();
        for (slot, name) in self.source_views.iter().zip(SOURCE_VIEW_NAMES) {
            if slot.is_none() {
                names.push(name.to_string());
            }
        }
        for (slot, name) in self.output_channels.iter().zip(OUTPUT_CHANNEL_NAMES) {
            if slot.is_none() {
                names.push(name.to_string());
            }
        }
        if self.iter_num.is_none() {
            names.push(ITER_NUM_NAME.to_string());
        }
        if self.num_nodes.is_none() {
            names.push(NUM_NODES_NAME.to_string());
        }
        for (slot, unif) in self.user_unifs.iter().zip(user_unifs) {
            if slot.is_none() {
                names.push(unif.name.clone());
            }
        }
        names
    }

    /// Highest bind group any resolved handle lives in
    pub fn max_group(&self) -> Option<u32> {
        self.source_views
            .iter()
            .chain(self.output_channels.iter())
            .chain([&self.iter_num, &self.num_nodes])
            .chain(self.user_unifs.iter())
            .flatten()
            .map(|slot| slot.group)
            .max()
    }
}

/// A compiled simulation program
#[derive(Debug, Clone)]
pub struct MorphProgram {
    pub name: String,
    /// Complete WGSL source, prelude included
    pub source: String,
    pub user_unifs: Vec<UserUnif>,
    pub handles: ProgramHandles,
    pub workgroup_size: [u32; 3],
    /// Unique per compile, so pipelines are never reused across reloads
    pub generation: u64,
}

impl Program for MorphProgram {
    fn name(&self) -> &str {
        &self.name
    }

    fn user_unifs(&self) -> &[UserUnif] {
        &self.user_unifs
    }

    fn user_unifs_mut(&mut self) -> &mut [UserUnif] {
        &mut self.user_unifs
    }
}

fn active_global(
    module: &naga::Module,
    function_info: &FunctionInfo,
    name: &str,
) -> Option<BindingSlot> {
    let (handle, var) = module
        .global_variables
        .iter()
        .find(|(_, var)| var.name.as_deref() == Some(name))?;
    let binding = var.binding.as_ref()?;
    if function_info[handle].is_empty() {
        return None;
    }
    Some(BindingSlot {
        group: binding.group,
        binding: binding.binding,
    })
}

fn is_vec4_uniform(module: &naga::Module, var: &naga::GlobalVariable) -> bool {
    let is_vec4 = match module.types[var.ty].inner {
        naga::TypeInner::Vector { size, scalar } => {
            size == naga::VectorSize::Quad && scalar == naga::Scalar::F32
        }
        _ => false,
    };
    var.space == naga::AddressSpace::Uniform && is_vec4
}

fn is_prelude_name(name: &str) -> bool {
    SOURCE_VIEW_NAMES.contains(&name)
        || OUTPUT_CHANNEL_NAMES.contains(&name)
        || name == ITER_NUM_NAME
        || name == NUM_NODES_NAME
}

/// Checks that the driver can supply every binding the entry point uses
fn check_bindings(
    module: &naga::Module,
    function_info: &FunctionInfo,
    user_unifs: &[UserUnif],
) -> std::result::Result<(), String> {
    let mut taken: HashMap<BindingSlot, &str> = HashMap::new();
    for (handle, var) in module.global_variables.iter() {
        let Some(binding) = var.binding.as_ref() else {
            continue;
        };
        if function_info[handle].is_empty() {
            continue;
        }
        let name = var.name.as_deref().unwrap_or("<unnamed>");
        let slot = BindingSlot {
            group: binding.group,
            binding: binding.binding,
        };

        if user_unifs.iter().any(|unif| unif.name == name) {
            if !is_vec4_uniform(module, var) {
                return Err(format!(
                    "user uniform '{}' must be declared as var<uniform> vec4<f32>",
                    name
                ));
            }
        } else if !is_prelude_name(name) {
            return Err(format!(
                "'{}' (group {}, binding {}) is neither a prelude global nor a declared user uniform",
                name, slot.group, slot.binding
            ));
        }
        if slot.group >= MAX_BIND_GROUPS {
            return Err(format!(
                "'{}' is in group {}, only groups below {} can be bound",
                name, slot.group, MAX_BIND_GROUPS
            ));
        }
        if let Some(other) = taken.insert(slot, name) {
            return Err(format!(
                "'{}' and '{}' share group {} binding {}",
                other, name, slot.group, slot.binding
            ));
        }
    }
    Ok(())
}

/// Compiles `source` against `prelude` and resolves all contract handles
///
/// Unresolved handles are logged as warnings; the program is still returned
/// and runs with those channels left undefined.
pub fn compile(
    name: &str,
    source: &str,
    user_unifs: Vec<UserUnif>,
    prelude: &str,
) -> Result<MorphProgram> {
    let full_source = format!("{}\n{}", prelude, source);
    let compile_error = |message: String| MorphError::Compile {
        program: name.to_string(),
        message,
    };

    let module = naga::front::wgsl::parse_str(&full_source)
        .map_err(|e| compile_error(e.emit_to_string(&full_source)))?;
    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(&full_source)))?;

    let (entry_index, entry_point) = module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.name == ENTRY_POINT && ep.stage == naga::ShaderStage::Compute)
        .ok_or_else(|| MorphError::MissingEntryPoint {
            program: name.to_string(),
            entry_point: ENTRY_POINT.to_string(),
        })?;
    let function_info = info.get_entry_point(entry_index);
    check_bindings(&module, function_info, &user_unifs).map_err(|message| {
        MorphError::Binding {
            program: name.to_string(),
            message,
        }
    })?;
    let resolve = |global: &str| active_global(&module, function_info, global);

    let user_handles = user_unifs.iter().map(|unif| resolve(&unif.name)).collect();

    let handles = ProgramHandles {
        source_views: SOURCE_VIEW_NAMES.map(resolve),
        output_channels: OUTPUT_CHANNEL_NAMES.map(resolve),
        iter_num: resolve(ITER_NUM_NAME),
        num_nodes: resolve(NUM_NODES_NAME),
        user_unifs: user_handles,
    };

    for missing in handles.unresolved_names(&user_unifs) {
        log::warn!("Program '{}': no active binding for '{}'", name, missing);
    }

    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    log::debug!(
        "Compiled program '{}' (generation {}, workgroup size {:?})",
        name,
        generation,
        entry_point.workgroup_size
    );

    Ok(MorphProgram {
        name: name.to_string(),
        source: full_source,
        user_unifs,
        handles,
        workgroup_size: entry_point.workgroup_size,
        generation,
    })
}

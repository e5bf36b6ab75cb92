use glam::{UVec2, Vec3, Vec4};
use morph::mesh::MeshBuilder;
use morph::nodes::{generate_grid, ZygoteOptions, ZygoteShape};
use morph::program::{parse_program_text, BindingSlot, Program, ProgramLoader, ProgramRegistry};
use morph::sim::{HostDoubleBuffer, HostProgram, NodeBuffers, Simulation};
use morph::{reconstruct, MeshColoring, MorphError, MorphNode, NodeStore};
use std::fs;
use std::path::PathBuf;

fn grid(samples: u32, with_faces: bool) -> NodeStore {
    NodeStore::from_nodes(&generate_grid(
        UVec2::splat(samples),
        &ZygoteOptions {
            shape: ZygoteShape::Plane,
            with_faces,
            jitter: 0.0,
            seed: 7,
        },
    ))
}

#[test]
fn seed_round_trip() {
    let mut buffers = HostDoubleBuffer::allocate(100).unwrap();
    let store = grid(5, true);
    buffers.write(0, &store).unwrap();
    assert_eq!(buffers.read(0, store.len()).unwrap(), store);
}

#[test]
fn zero_iterations_leave_the_seed() {
    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(100).unwrap());
    let store = grid(4, false);
    simulation.seed(store.clone()).unwrap();
    assert_eq!(simulation.run(&HostProgram::spring(), 0).unwrap(), 0);
    assert_eq!(simulation.read_result().unwrap(), store);
}

#[test]
fn identity_reproduces_the_seed_for_every_k() {
    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(100).unwrap());
    let store = grid(6, true);
    simulation.seed(store.clone()).unwrap();
    for k in 0..7 {
        assert_eq!(simulation.run(&HostProgram::identity(), k).unwrap(), k % 2);
        assert_eq!(simulation.read_result().unwrap(), store);
    }
}

#[test]
fn steps_only_see_the_previous_iteration() {
    // every node becomes the sum of its right neighbor's previous data.x and 1
    let program = HostProgram::from_fn("chain", Vec::new(), |i, source, _| {
        let mut node = source.node(i).unwrap_or_default();
        let right = source.neighbor(i, 0).map_or(0.0, |n| n.data.x);
        node.data.x = right + 1.0;
        node
    });
    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(16).unwrap());
    simulation.seed(grid(4, false)).unwrap();
    simulation.run(&program, 2).unwrap();
    let result = simulation.read_result().unwrap();
    // with read-only sources, two steps can only carry data two links along
    let row: Vec<f32> = (0..4).map(|x| result.node_at(x).unwrap().data.x).collect();
    assert_eq!(row, vec![2.0, 2.0, 2.0, 1.0]);
}

#[test]
fn degenerate_quad_contributes_nothing() {
    let mut builder = MeshBuilder::new();
    let a = Vec3::ZERO;
    let b = Vec3::ZERO;
    let c = Vec3::X;
    let d = Vec3::X;
    assert!(!builder.add_triangle_face(a, b, c, [1.0; 4]));
    assert!(!builder.add_triangle_face(a, c, d, [1.0; 4]));
    let mesh = builder.build();
    assert!(mesh.vertices.is_empty());
    assert!(mesh.indices.is_empty());
}

#[test]
fn two_by_two_grid_is_one_upward_quad() {
    for with_faces in [false, true] {
        let mesh = reconstruct(&grid(2, with_faces), &MeshColoring::default());
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices.len(), 6);
        for vertex in &mesh.vertices {
            assert_eq!(Vec3::from_array(vertex.normal), Vec3::Y);
        }
    }
    let single = reconstruct(&grid(1, false), &MeshColoring::default());
    assert_eq!(single.triangle_count(), 0);
}

#[test]
fn growth_keeps_boundary_pinned() {
    let store = grid(5, false);
    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(64).unwrap());
    simulation.seed(store.clone()).unwrap();
    simulation.run(&HostProgram::spring(), 20).unwrap();
    let result = simulation.read_result().unwrap();

    for (before, after) in store.iter().zip(result.iter()) {
        if before.is_boundary() {
            assert_eq!(after.pos, before.pos);
            assert_eq!(after.vel, Vec4::ZERO);
        } else {
            // gravity pulls the interior below the plane
            assert!(after.pos.y < 0.0);
        }
        assert_eq!(after.neighbors, before.neighbors);
    }
}

#[test]
fn seed_over_capacity_is_rejected() {
    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(3).unwrap());
    let err = simulation.seed(grid(2, false)).unwrap_err();
    assert!(matches!(err, MorphError::Capacity { .. } | MorphError::IndexOutOfBounds { .. }));
}

#[test]
fn wrong_header_order_fails_to_parse() {
    let text = "speed 5.0 comps 4 min -1.0 max 1.0 default 0.0 0.0 0.0 0.0 END_USER_UNIFS fn main() {}";
    assert!(matches!(
        parse_program_text(text),
        Err(MorphError::MalformedHeader { .. })
    ));
}

fn temp_shader_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const SCALE_PROGRAM: &str = "\
scale comps 1 min 0.0 max 10.0 speed 0.1 default 1.0
END_USER_UNIFS
@group(3) @binding(0) var<uniform> scale: vec4<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= u32(num_nodes)) {
        return;
    }
    out_pos[i] = pos_buf[i] * scale.x;
    out_vel[i] = vel_buf[i];
    out_neighbors[i] = neighbors_buf[i];
    out_data[i] = data_buf[i];
}
";

#[test]
fn reload_keeps_active_index_and_survives_bad_files() {
    let dir = temp_shader_dir("morph_reload_test");
    fs::write(dir.join("scale.wgsl"), SCALE_PROGRAM).unwrap();
    fs::write(dir.join("copy.wgsl"), SCALE_PROGRAM.replace("* scale.x", "")).unwrap();
    let loader = ProgramLoader::new(&dir);

    let mut registry = ProgramRegistry::new();
    registry.replace_all(
        loader
            .load_all(&["copy.wgsl".to_string(), "scale.wgsl".to_string()])
            .unwrap(),
    );
    registry.set_active_by_name("scale").unwrap();
    registry
        .active_mut()
        .unwrap()
        .user_unif_mut("scale")
        .unwrap()
        .set_value(&[3.0]);
    let generation = registry.active().unwrap().generation;

    // same name, fresh compile
    let index = registry.reload("scale", || loader.load("scale.wgsl")).unwrap();
    assert_eq!(index, 1);
    assert_eq!(registry.active_index(), 1);
    assert_ne!(registry.active().unwrap().generation, generation);
    assert_eq!(registry.active().unwrap().user_unif("scale").unwrap().value(), &[3.0]);

    // a malformed file leaves the registered program alone
    fs::write(dir.join("scale.wgsl"), "scale comps 1 min 0.0 END_USER_UNIFS").unwrap();
    let before = registry.active().unwrap().generation;
    assert!(registry.reload("scale", || loader.load("scale.wgsl")).is_err());
    assert_eq!(registry.active().unwrap().generation, before);
    assert_eq!(registry.active_index(), 1);
}

#[test]
fn reload_rejects_programs_that_cannot_be_bound() {
    let dir = temp_shader_dir("morph_unbindable_reload_test");
    fs::write(dir.join("scale.wgsl"), SCALE_PROGRAM).unwrap();
    let loader = ProgramLoader::new(&dir);
    let mut registry = ProgramRegistry::new();
    registry.register(loader.load("scale.wgsl").unwrap());
    let before = registry.active().unwrap().generation;

    // valid WGSL, but past the bind groups a pipeline can use
    let past_limit = SCALE_PROGRAM.replace("@group(3) @binding(0)", "@group(8) @binding(0)");
    fs::write(dir.join("scale.wgsl"), past_limit).unwrap();
    assert!(matches!(
        registry.reload("scale", || loader.load("scale.wgsl")),
        Err(MorphError::Binding { .. })
    ));

    // a global the driver has nothing to bind to
    let stray = SCALE_PROGRAM
        .replace("var<uniform> scale", "var<uniform> stray")
        .replace("* scale.x", "* stray.x");
    fs::write(dir.join("scale.wgsl"), stray).unwrap();
    assert!(matches!(
        registry.reload("scale", || loader.load("scale.wgsl")),
        Err(MorphError::Binding { .. })
    ));

    let active = registry.active().unwrap();
    assert_eq!(active.generation, before);
    assert_eq!(
        active.handles.user_unifs,
        vec![Some(BindingSlot { group: 3, binding: 0 })]
    );
}

#[test]
fn faces_pass_through_growth() {
    let store = grid(3, true);
    let faces: Vec<MorphNode> = store.iter().filter(|n| n.pos.w == 1.0).collect();
    assert_eq!(faces.len(), 4);

    let mut simulation = Simulation::new(HostDoubleBuffer::allocate(64).unwrap());
    simulation.seed(store).unwrap();
    simulation.run(&HostProgram::spring(), 3).unwrap();
    let result = simulation.read_result().unwrap();
    let after: Vec<MorphNode> = result.iter().filter(|n| n.pos.w == 1.0).collect();
    assert_eq!(after, faces);
}

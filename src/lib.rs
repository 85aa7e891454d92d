//! # truss-export: hub, hinge and strut export for actuated trusses
//!
//! Takes a triangulated truss with rigid struts and linear actuators and
//! works out the hardware needed to build it.
//!
//! ## Design Principles
//!
//! 1. **One owned store**: [`TrussGraph`] is passed explicitly into each stage
//! 2. **Trait seams**: physics sits behind [`Simulator`] and [`Relaxation`],
//!    with reference implementations in [`sim`]
//! 3. **Plain records out**: the [`PartManifest`] is all a part writer needs
//! 4. **Deterministic**: ids are monotone, iteration is in id order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nalgebra::Point3;
//! use truss_export::{ExportConfig, ExportPipeline, LinkKind, TrussGraph};
//!
//! # fn example() -> truss_export::Result<()> {
//! let config = ExportConfig::default();
//! let mut graph = TrussGraph::with_presets(&config.presets);
//! let a = graph.create_node(Point3::new(0.0, 0.0, 0.0));
//! let b = graph.create_node(Point3::new(1000.0, 0.0, 0.0));
//! let c = graph.create_node(Point3::new(500.0, 866.0, 0.0));
//! graph.create_edge(a, b, LinkKind::Rigid)?;
//! graph.create_edge(b, c, LinkKind::Rigid)?;
//! graph.create_edge(c, a, LinkKind::Actuator)?;
//!
//! let mut pipeline = ExportPipeline::reference(config);
//! let report = pipeline.run(&mut graph)?;
//! truss_export::write_manifest(&report.manifest, &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Rigidity | [`rigidity`] | static groups |
//! | Topology | [`topology`] | insets, hubs, hinges |
//! | Elongation | [`elongation`] | per-end clearances |
//! | Export | [`export`] | part manifest |

use tracing::info;

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod geometry;
pub mod model;
pub mod graph;
pub mod sim;
pub mod rigidity;
pub mod topology;
pub mod elongation;
pub mod export;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, NodeId, Pod, PodId,
    Edge, EdgeId, LinkKind,
    Triangle, TriangleId,
    GraphEvent, ObjectRef, PositionSnapshot,
};

// ============================================================================
// Re-exports: Store and configuration
// ============================================================================

pub use graph::{TrussGraph, GraphRecord};
pub use config::{ExportConfig, Presets, RigidityConfig};

// ============================================================================
// Re-exports: Collaborators
// ============================================================================

pub use sim::{
    Simulator, Relaxation, DriveConfig, LengthRequest, RelaxationReport,
    KinematicSimulator, PositionRelaxation, SolverConfig,
};

// ============================================================================
// Re-exports: Stages
// ============================================================================

pub use rigidity::{GroupId, StaticGroup, RigidityReport, find_static_groups};
pub use topology::{Hub, Hinge, RotaryInset, Topology, synthesize};
pub use elongation::{ElongationTargets, ElongationReport, ElongationRecord, compute_targets};
pub use export::{PartManifest, HubRecord, HingeRecord, HingeConnection, build_manifest, write_manifest};

// ============================================================================
// Pipeline
// ============================================================================

/// A pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Prepare,
    Rigidity,
    Topology,
    Elongation,
    Export,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Rigidity => "rigidity",
            Stage::Topology => "topology",
            Stage::Elongation => "elongation",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Outputs of every stage that completed in the last run.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Pre-inset partition, see [`ExportReport::rigidity`].
    pub rigidity: Option<RigidityReport>,
    pub topology: Option<Topology>,
    pub targets: Option<ElongationTargets>,
    pub elongation: Option<ElongationReport>,
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    /// The partition as analyzed, before any rotary inset. Groups here can
    /// still name triangles the inset deleted; [`Topology::groups`] holds
    /// the partition the hardware was built from.
    pub rigidity: RigidityReport,
    pub topology: Topology,
    pub elongation: ElongationReport,
    pub manifest: PartManifest,
}

/// The primary entry point. Owns the collaborators and runs the stages
/// strictly in order against a caller-owned graph.
pub struct ExportPipeline<S: Simulator, R: Relaxation> {
    simulator: S,
    relaxation: R,
    config: ExportConfig,
    state: PipelineState,
}

impl<S: Simulator, R: Relaxation> ExportPipeline<S, R> {
    pub fn new(simulator: S, relaxation: R, config: ExportConfig) -> Self {
        Self { simulator, relaxation, config, state: PipelineState::default() }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// What the last [`run`](Self::run) produced before it returned.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run every stage. The graph is edited in place (insets, elongations,
    /// relaxed positions); on failure it is left as the failing stage found
    /// it, and [`state`](Self::state) holds the earlier outputs.
    pub fn run(&mut self, graph: &mut TrussGraph) -> Result<ExportReport> {
        self.state = PipelineState::default();
        self.config.validate().map_err(|e| e.at(Stage::Prepare))?;

        // Phase 0: every end starts at the floor
        graph.reset_elongations().map_err(|e| e.at(Stage::Prepare))?;

        // Phase 1: Rigidity
        let rigidity = find_static_groups(graph, &mut self.simulator, &self.config.rigidity)
            .map_err(|e| e.at(Stage::Rigidity))?;
        self.state.rigidity = Some(rigidity.clone());

        // Phase 2: Topology
        let topology = synthesize(graph, rigidity.groups.clone(), &self.config.presets)
            .map_err(|e| e.at(Stage::Topology))?;
        self.state.topology = Some(topology.clone());

        // Phase 3: Elongation
        let targets = compute_targets(graph, &topology, &self.config.presets)
            .map_err(|e| e.at(Stage::Elongation))?;
        self.state.targets = Some(targets.clone());
        let elongation = elongation::solve(graph, &targets, &mut self.relaxation, &self.config)
            .map_err(|e| e.at(Stage::Elongation))?;
        self.state.elongation = Some(elongation.clone());

        // Phase 4: Export
        let manifest = build_manifest(graph, &topology, &elongation, &self.config.presets)
            .map_err(|e| e.at(Stage::Export))?;

        info!(
            groups = rigidity.groups.len(),
            hubs = manifest.hubs.len(),
            hinges = manifest.hinges.len(),
            passes = elongation.passes,
            "export complete"
        );
        Ok(ExportReport { rigidity, topology, elongation, manifest })
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn relaxation(&self) -> &R {
        &self.relaxation
    }
}

/// Pipeline over the built-in projection solvers.
impl ExportPipeline<KinematicSimulator, PositionRelaxation> {
    pub fn reference(config: ExportConfig) -> Self {
        let simulator = KinematicSimulator::new(config.rigidity.drive_fraction);
        Self::new(simulator, PositionRelaxation::default(), config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    #[error("Degenerate pose: {0}")]
    DegeneratePose(String),

    #[error("Simulator unavailable: {0}")]
    SimulatorUnavailable(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Rotary hinge axis error: {0}")]
    RotaryAxis(String),

    #[error("Node {node} is fixed but edge {edge} targets it")]
    FixedNodeTargeted { node: NodeId, edge: EdgeId },

    #[error("Node {node} is not an end of edge {edge}")]
    NotIncident { node: NodeId, edge: EdgeId },

    #[error("More than one hinge on the same side of edge {edge} at node {node}")]
    HingeConflict { node: NodeId, edge: EdgeId },

    #[error("Spacer on edge {edge} at node {node} is {l3:.1}mm, minimum is {minimum:.1}mm")]
    SpacerTooShort { node: NodeId, edge: EdgeId, l3: f64, minimum: f64 },

    #[error("Sub-hub at node {node} joins two hinges on edge {edge}")]
    SubHubDoubleHinge { node: NodeId, edge: EdgeId },

    #[error("Elongations not settled after {passes} passes ({pending} edges pending)")]
    NoConvergence { passes: usize, pending: usize },

    #[error("Relaxation failed: {0}")]
    Relaxation(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    fn at(self, stage: Stage) -> Self {
        Error::Stage { stage, source: Box::new(self) }
    }

    /// The error underneath any stage tag.
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod modules;

pub use modules::channel::{Channel, ChannelStats, Outcome};
pub use modules::comms::{CommPolicy, Dispatch, Peer, SwarmView};
pub use modules::config::SimConfig;
pub use modules::error::{SimError, SimResult};
pub use modules::geometry::{Point, Polygon};
pub use modules::map::{self, ObstacleMap, default_map, generate_start_positions};
pub use modules::navigation::{Bounds, plan_path};
pub use modules::report::{
    NetworkSample, ReportStore, RoverResult, RunReport, load_report, reports_dir, save_report,
};
pub use modules::rover::{Reception, Rover, RoverId, RoverParams, RoverState};
pub use modules::sim::{Event, Simulation, TickReport};
pub use modules::world_model::{Fusion, WorldModel};

pub mod commands;
pub mod handlers;

pub use commands::{CLAP_STYLING, DEFAULT_DB_PATH, command_argument_builder};
pub use handlers::{
    build_geofence, crawl_config_from_args, load_points_from_file, load_replay_from_file,
    parse_point_line, parse_replay_line, resolve_db_path,
};

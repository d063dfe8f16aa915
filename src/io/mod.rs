pub mod active_plugins;
pub mod game_dirs;
pub mod plugin_desc;
pub mod settings;
pub mod write_order;

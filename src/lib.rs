pub mod api;
pub mod discord;
pub mod twitch;
pub mod util;

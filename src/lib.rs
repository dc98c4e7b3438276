pub mod actuator;
pub mod communications;
pub mod configs;
pub mod feed;
pub mod optimizer;
pub mod ring_buffer;
pub mod track;
pub mod util;

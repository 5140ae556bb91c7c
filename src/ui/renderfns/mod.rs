pub mod footer;
pub mod header;
pub mod state;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use state::{draw_placeholder, refresh_suffix};
pub use utils::{centered_rect, host_of, money, truncate};

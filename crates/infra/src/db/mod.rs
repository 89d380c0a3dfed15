pub mod messages_repo;
pub mod migrations;
pub mod pool;
pub mod widgets_repo;

pub use messages_repo::{MessageRecord, MessagesRepoError, count_messages, insert_messages};
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolError, connect_lazy};
pub use widgets_repo::{WidgetsRepoError, insert_chart_points, insert_cloud_tags, insert_histograms};

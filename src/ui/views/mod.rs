mod book_detail;
mod book_list;
mod dashboard;
mod profile;

pub use book_detail::BookDetailView;
pub use book_list::BookListView;
pub use dashboard::DashboardView;
pub use profile::ProfileView;

#[cfg(test)]
pub(crate) mod testing;

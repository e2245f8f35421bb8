mod https_page_fetcher;

pub use https_page_fetcher::*;

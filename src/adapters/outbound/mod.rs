mod pmseries_client;

pub use pmseries_client::PmseriesClient;

pub mod traits;
pub mod azure_search;

pub use traits::{RetrievalClient, RetrievalQuery, SearchHit, MAX_STRICTNESS, MIN_STRICTNESS};
pub use azure_search::{AzureSearchClient, AzureSearchClientBuilder, AzureSearchConfig, SearchFields};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopifyApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Invalid GraphQL query: {0}")]
    InvalidGraphQL(String),
    #[error("GraphQL query failed: {0}")]
    GraphQLError(String),
    #[error("The mutation was rejected: {0}")]
    UserErrors(String),
    #[error("The response was empty")]
    EmptyResponse,
}

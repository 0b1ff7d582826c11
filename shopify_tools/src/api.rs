use std::sync::Arc;

use graphql_parser::parse_query;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    config::ShopifyConfig,
    data_objects::{CustomAttribute, ShopSettings, UserError},
    ShopifyApiError,
};

#[derive(Clone)]
pub struct ShopifyApi {
    config: ShopifyConfig,
    client: Arc<Client>,
}

/// The Admin API global id for an order, given its numeric id.
pub fn order_gid(order_id: i64) -> String {
    format!("gid://shopify/Order/{order_id}")
}

impl ShopifyApi {
    pub fn new(config: ShopifyConfig) -> Result<Self, ShopifyApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.admin_access_token.reveal().as_str())
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        headers.insert("X-Shopify-Access-Token", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn shop(&self) -> &str {
        self.config.shop.as_str()
    }

    pub fn url(&self) -> String {
        format!("https://{}/admin/api/{}/graphql.json", self.config.shop, self.config.api_version)
    }

    pub async fn graphql_query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<T, ShopifyApiError> {
        let query = parse_query::<String>(query).map_err(|e| ShopifyApiError::InvalidGraphQL(e.to_string()))?;
        let mut body = serde_json::json!({
            "query": query.to_string(),
        });
        if let Some(vars) = variables {
            body["variables"] = vars;
        }
        trace!("🛍️ Sending GraphQL query: {body}");
        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ShopifyApiError::ResponseError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ShopifyApiError::ResponseError(e.to_string()))?;
            return Err(ShopifyApiError::QueryError { status, message });
        }
        let result = response.json::<Value>().await.map_err(|e| ShopifyApiError::JsonError(e.to_string()))?;
        if let Some(errors) = result["errors"].as_array() {
            let e = errors.iter().map(|e| e.to_string()).collect::<Vec<String>>().join(", ");
            return Err(ShopifyApiError::GraphQLError(e));
        }
        let data = result["data"].clone();
        trace!("🛍️ GraphQL response: {data}");
        trace!("🛍️ GraphQL costs: {}", result["extensions"]["cost"]);
        if data.is_null() {
            return Err(ShopifyApiError::EmptyResponse);
        }
        serde_json::from_value(data).map_err(|e| ShopifyApiError::JsonError(e.to_string()))
    }

    pub async fn fetch_order_custom_attributes(&self, order_gid: &str) -> Result<Vec<CustomAttribute>, ShopifyApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Order {
            custom_attributes: Vec<CustomAttribute>,
        }
        #[derive(Deserialize)]
        struct OrderResponse {
            order: Option<Order>,
        }
        let query = r#"
        query GetOrderCustomAttributes($id: ID!) {
          order(id: $id) { customAttributes { key value } }
        }"#;
        let variables = serde_json::json!({ "id": order_gid });
        debug!("🛍️ Fetching custom attributes for {order_gid}");
        let result = self.graphql_query::<OrderResponse>(query, Some(variables)).await?;
        let order = result.order.ok_or(ShopifyApiError::EmptyResponse)?;
        Ok(order.custom_attributes)
    }

    /// Replaces the custom attribute list of the order. Shopify has no append operation, so callers are expected to
    /// send the full list.
    pub async fn update_order_custom_attributes(
        &self,
        order_gid: &str,
        attributes: &[CustomAttribute],
    ) -> Result<Vec<CustomAttribute>, ShopifyApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Order {
            custom_attributes: Vec<CustomAttribute>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OrderUpdate {
            order: Option<Order>,
            user_errors: Vec<UserError>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OrderUpdateResponse {
            order_update: OrderUpdate,
        }
        let mutation = r#"
        mutation UpdateOrderCustomAttributes($input: OrderInput!) {
          orderUpdate(input: $input) {
            order { id customAttributes { key value } }
            userErrors { field message }
          }
        }"#;
        let variables = serde_json::json!({
            "input": { "id": order_gid, "customAttributes": attributes }
        });
        debug!("🛍️ Updating custom attributes for {order_gid}: {variables}");
        let response = self.graphql_query::<OrderUpdateResponse>(mutation, Some(variables)).await?;
        let update = response.order_update;
        if !update.user_errors.is_empty() {
            return Err(ShopifyApiError::UserErrors(UserError::join(&update.user_errors)));
        }
        let order = update.order.ok_or(ShopifyApiError::EmptyResponse)?;
        info!("🛍️ Custom attributes for {order_gid} updated");
        Ok(order.custom_attributes)
    }

    pub async fn fetch_shop_settings(&self) -> Result<ShopSettings, ShopifyApiError> {
        #[derive(Deserialize)]
        struct ShopResponse {
            shop: ShopSettings,
        }
        let query = "query { shop { name taxesIncluded } }";
        debug!("🛍️ Fetching shop settings for {}", self.config.shop);
        let result = self.graphql_query::<ShopResponse>(query, None).await?;
        Ok(result.shop)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_gids() {
        assert_eq!(order_gid(820982911946154508), "gid://shopify/Order/820982911946154508");
    }

    #[test]
    fn graphql_url() {
        let config = ShopifyConfig {
            shop: "my-shop.myshopify.com".into(),
            api_version: "2024-04".into(),
            ..Default::default()
        };
        let api = ShopifyApi::new(config).expect("client should build");
        assert_eq!(api.url(), "https://my-shop.myshopify.com/admin/api/2024-04/graphql.json");
        assert_eq!(api.shop(), "my-shop.myshopify.com");
    }

    #[tokio::test]
    async fn malformed_queries_are_rejected_locally() {
        let api = ShopifyApi::new(ShopifyConfig::default()).expect("client should build");
        let err = api.graphql_query::<Value>("query { shop { name ", None).await.unwrap_err();
        assert!(matches!(err, ShopifyApiError::InvalidGraphQL(_)));
    }

    #[test]
    fn user_errors_are_joined() {
        let errors = vec![
            UserError { field: Some(vec!["customAttributes".into(), "0".into()]), message: "is invalid".into() },
            UserError { field: None, message: "Order is archived".into() },
        ];
        assert_eq!(UserError::join(&errors), "customAttributes.0: is invalid, Order is archived");
    }
}

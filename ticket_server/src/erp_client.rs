use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use ticket_engine::{
    report_objects::MonthlyReport,
    traits::{ReportTransport, TransportError, TransportResponse},
};

use crate::{config::ErpConfig, errors::ServerError};

/// Posts monthly reports to the ERP with basic authentication.
#[derive(Clone)]
pub struct ErpClient {
    endpoint: String,
    client: Arc<Client>,
}

impl std::fmt::Debug for ErpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ErpClient ({})", self.endpoint)
    }
}

pub fn basic_auth_value(username: &str, password: &str) -> String {
    format!("Basic {}", base64::encode(format!("{username}:{password}")))
}

impl ErpClient {
    pub fn new(config: &ErpConfig) -> Result<Self, ServerError> {
        let mut headers = HeaderMap::with_capacity(2);
        let mut auth = HeaderValue::from_str(&basic_auth_value(&config.username, config.password.reveal()))
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid ERP credentials. {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not build the ERP client. {e}")))?;
        Ok(Self { endpoint: config.endpoint.clone(), client: Arc::new(client) })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl ReportTransport for ErpClient {
    async fn post_report(&self, report: &MonthlyReport) -> Result<TransportResponse, TransportError> {
        trace!("📮️ POST {} for reference {}", self.endpoint, report.invoice.header.reference);
        let response = self
            .client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError(e.to_string()))?;
        debug!("📮️ ERP answered HTTP {status}: {body}");
        Ok(TransportResponse::new(status, body))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn report() -> MonthlyReport {
        serde_json::from_value(serde_json::json!({
            "Factura": {
                "Cabecera": {
                    "Identificador": "1",
                    "Fecha_documento": "20250331",
                    "Fecha_contable": "20250331",
                    "Ejercicio": "2025",
                    "Periodo": "03",
                    "Sociedad": "H002",
                    "Clase_documento": "Factura",
                    "Referencia": "T25-0002",
                    "Texto_cabecera": "T25-0001_",
                    "Fecha_IVA": "20250331"
                },
                "Posicion_cliente": {
                    "Posicion": "1",
                    "Cuenta_cliente": "Cliente",
                    "Cuenta": "",
                    "Importe": "60.50",
                    "Moneda": "EUR",
                    "Num_Asignacion": "T25-0001_T25-0002",
                    "Texto_explicativo": "",
                    "Centro_beneficio": "CEBE"
                },
                "Posicion_ingreso": [],
                "Posicion_impuestos": []
            }
        }))
        .unwrap()
    }

    #[test]
    fn basic_auth_header() {
        assert_eq!(basic_auth_value("user", "pass"), "Basic dXNlcjpwYXNz");
        assert_eq!(basic_auth_value("erp", ""), "Basic ZXJwOg==");
    }

    #[test]
    fn credentials_are_encoded_before_use() {
        let config = ErpConfig { username: "a\nb".into(), ..Default::default() };
        // base64 output never contains a newline, so the header is always valid
        assert!(ErpClient::new(&config).is_ok());
    }

    #[tokio::test]
    async fn unreachable_erp_is_a_transport_error() {
        let config = ErpConfig {
            endpoint: "http://127.0.0.1:9/reports".into(),
            username: "user".into(),
            password: "pass".into(),
            timeout: Duration::from_secs(2),
        };
        let client = ErpClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/reports");
        let err = client.post_report(&report()).await.unwrap_err();
        assert!(!err.0.is_empty());
    }
}

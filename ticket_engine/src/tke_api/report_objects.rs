//! The posting document the ERP accepts for a month of tickets.
//!
//! Field names on the wire are fixed by the ERP schema, so every field carries an explicit serde rename. All amounts
//! are strings with two decimals; income and tax positions are posted as negative amounts, the customer position as a
//! positive one.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReport {
    #[serde(rename = "Factura")]
    pub invoice: Invoice,
}

impl MonthlyReport {
    pub fn set_identifier(&mut self, identifier: i64) {
        self.invoice.header.identifier = Some(identifier.to_string());
    }

    pub fn identifier(&self) -> Option<&str> {
        self.invoice.header.identifier.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "Cabecera")]
    pub header: ReportHeader,
    #[serde(rename = "Posicion_cliente")]
    pub customer_position: CustomerPosition,
    #[serde(rename = "Posicion_ingreso")]
    pub income_positions: Vec<IncomePosition>,
    #[serde(rename = "Posicion_impuestos")]
    pub tax_positions: Vec<TaxPosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportHeader {
    #[serde(rename = "Identificador", default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Last day of the month, `YYYYMMDD`
    #[serde(rename = "Fecha_documento")]
    pub document_date: String,
    #[serde(rename = "Fecha_contable")]
    pub posting_date: String,
    #[serde(rename = "Ejercicio")]
    pub fiscal_year: String,
    /// Two-digit month
    #[serde(rename = "Periodo")]
    pub period: String,
    #[serde(rename = "Sociedad")]
    pub company_code: String,
    #[serde(rename = "Clase_documento")]
    pub document_class: String,
    /// The last ticket number of the month
    #[serde(rename = "Referencia")]
    pub reference: String,
    /// `{first ticket}_`
    #[serde(rename = "Texto_cabecera")]
    pub header_text: String,
    #[serde(rename = "Fecha_IVA")]
    pub vat_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPosition {
    #[serde(rename = "Posicion")]
    pub position: String,
    #[serde(rename = "Cuenta_cliente")]
    pub customer_account: String,
    #[serde(rename = "Cuenta")]
    pub account: String,
    #[serde(rename = "Importe")]
    pub amount: String,
    #[serde(rename = "Moneda")]
    pub currency: String,
    /// `{first ticket}_{last ticket}`
    #[serde(rename = "Num_Asignacion")]
    pub assignment: String,
    #[serde(rename = "Texto_explicativo")]
    pub description: String,
    #[serde(rename = "Centro_beneficio")]
    pub profit_center: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomePosition {
    #[serde(rename = "Posicion")]
    pub position: String,
    #[serde(rename = "Cuenta_ingreso")]
    pub income_account: String,
    #[serde(rename = "Importe")]
    pub amount: String,
    #[serde(rename = "Moneda")]
    pub currency: String,
    #[serde(rename = "Indicador_IVA")]
    pub vat_indicator: String,
    #[serde(rename = "Centro_beneficio")]
    pub profit_center: String,
    #[serde(rename = "Elemento_PEP")]
    pub project_element: String,
    #[serde(rename = "Num_asignacion")]
    pub assignment: String,
    #[serde(rename = "Texto_explicativo")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxPosition {
    #[serde(rename = "Posicion")]
    pub position: String,
    #[serde(rename = "Cuenta_impuestos")]
    pub tax_account: String,
    #[serde(rename = "Importe")]
    pub amount: String,
    #[serde(rename = "Moneda")]
    pub currency: String,
    #[serde(rename = "Indicador_IVA")]
    pub vat_indicator: String,
    #[serde(rename = "Num_asignacion")]
    pub assignment: String,
    #[serde(rename = "Texto_explicativo")]
    pub description: String,
    #[serde(rename = "Centro_beneficio")]
    pub profit_center: String,
    /// Always positive
    #[serde(rename = "Base_Imponible_IVA")]
    pub taxable_base: String,
}

/// The fixed account codes and labels stamped on every posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingConstants {
    pub company_code: String,
    pub document_class: String,
    pub customer_account: String,
    pub profit_center: String,
    pub income_account: String,
    pub tax_account: String,
    pub project_element: String,
}

impl Default for PostingConstants {
    fn default() -> Self {
        Self {
            company_code: "H002".to_string(),
            document_class: "Factura".to_string(),
            customer_account: "Cliente".to_string(),
            profit_center: "CEBE".to_string(),
            income_account: "7050000000".to_string(),
            tax_account: "4770000000".to_string(),
            project_element: "IMPUTACIÓN".to_string(),
        }
    }
}

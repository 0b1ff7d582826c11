
mod webhooks {
    use std::sync::Arc;

    use serde_json::json;
    use ticket_engine::{
        db_types::TicketSource,
        test_utils::MemoryDatabase,
        traits::{AnnotationOutcome, PlatformError},
        StoreConfigApi,
        TicketNumberGenerator,
    };

    use super::mocks::{MockAnnotator, MockTaxSettings};
    use crate::{
        errors::WebhookError,
        webhooks::{WebhookHandlers, WebhookOutcome},
    };

    const SHOP: &str = "my-shop.myshopify.com";

    fn handlers(
        db: &MemoryDatabase,
        taxes: MockTaxSettings,
        annotator: MockAnnotator,
    ) -> WebhookHandlers<MemoryDatabase, MockAnnotator, MockTaxSettings> {
        let tickets = Arc::new(TicketNumberGenerator::new(db.clone()));
        let store_config = Arc::new(StoreConfigApi::new(db.clone(), taxes));
        WebhookHandlers::new(tickets, store_config, Arc::new(annotator), Some("ceco".to_string()))
    }

    fn taxes_included(included: bool) -> MockTaxSettings {
        let mut taxes = MockTaxSettings::new();
        taxes.expect_fetch_taxes_included().times(1).returning(move |_| Ok(included));
        taxes
    }

    fn order_body(tags: &str) -> String {
        json!({
            "id": 555,
            "admin_graphql_api_id": "gid://shopify/Order/555",
            "name": "#1001",
            "created_at": "2025-03-10T10:15:00Z",
            "total_price": "190.00",
            "currency": "EUR",
            "tags": tags,
            "line_items": [{
                "id": 1,
                "title": "Widget",
                "quantity": 2,
                "price": "100.00",
                "discount_allocations": [{"amount": "10.00"}],
                "tax_lines": [{"rate": 0.21, "title": "IVA", "price": "32.98"}]
            }]
        })
        .to_string()
    }

    fn refund_body() -> String {
        let amount = |a: &str| json!({"amount": a, "currency_code": "EUR"});
        json!({
            "id": 9001,
            "order_id": 555,
            "created_at": "2025-03-12T08:00:00Z",
            "refund_line_items": [{
                "id": 1,
                "quantity": 1,
                "subtotal_set": {"shop_money": amount("60.50"), "presentment_money": amount("60.50")},
                "line_item": {"price": "60.50", "tax_lines": [{"rate": 0.21, "title": "IVA", "price": "10.50"}]}
            }]
        })
        .to_string()
    }

    fn ticket_id(outcome: &WebhookOutcome) -> &str {
        match outcome {
            WebhookOutcome::Ticketed { ticket, .. } => ticket.id.as_str(),
            WebhookOutcome::Discarded(reason) => panic!("Expected a ticket, but the event was discarded: {reason}"),
        }
    }

    #[tokio::test]
    async fn paid_order_is_ticketed_once() {
        let db = MemoryDatabase::new();
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_annotate_order()
            .withf(|id, ticket| *id == 555 && ticket.to_string() == "T25-0001")
            .times(2)
            .returning(|_, _| Ok(AnnotationOutcome::AlreadyPresent));
        let handlers = handlers(&db, taxes_included(true), annotator);

        let first = handlers.dispatch("orders/paid", SHOP, &order_body("")).await.unwrap();
        assert_eq!(ticket_id(&first), "T25-0001");
        assert!(matches!(first, WebhookOutcome::Ticketed { annotated: true, .. }));
        // Redelivery. The store configuration is cached, and no new number is issued
        let second = handlers.dispatch("orders/paid", SHOP, &order_body("")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(db.tickets().len(), 1);
        assert_eq!(db.counter("counter-2025", "2025").unwrap().current_value, 1);
    }

    #[tokio::test]
    async fn excluded_orders_are_discarded() {
        let db = MemoryDatabase::new();
        let handlers = handlers(&db, taxes_included(false), MockAnnotator::new());
        let outcome = handlers.dispatch("orders/paid", SHOP, &order_body("vip, CECO")).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Discarded(_)));
        assert!(db.tickets().is_empty());
    }

    #[tokio::test]
    async fn failed_annotation_keeps_the_ticket() {
        let db = MemoryDatabase::new();
        let mut annotator = MockAnnotator::new();
        annotator.expect_annotate_order().returning(|_, _| Err(PlatformError("Order is archived".into())));
        let handlers = handlers(&db, taxes_included(true), annotator);
        let outcome = handlers.dispatch("orders/paid", SHOP, &order_body("")).await.unwrap();
        assert_eq!(ticket_id(&outcome), "T25-0001");
        assert!(matches!(outcome, WebhookOutcome::Ticketed { annotated: false, .. }));
        assert_eq!(db.tickets().len(), 1);
    }

    #[tokio::test]
    async fn refunds_annotate_the_refunded_order() {
        let db = MemoryDatabase::new();
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_annotate_order()
            .withf(|id, _| *id == 555)
            .times(2)
            .returning(|_, _| Ok(AnnotationOutcome::Annotated));
        let handlers = handlers(&db, taxes_included(true), annotator);
        handlers.dispatch("orders/paid", SHOP, &order_body("")).await.unwrap();
        let outcome = handlers.dispatch("refunds/create", SHOP, &refund_body()).await.unwrap();
        assert_eq!(ticket_id(&outcome), "T25-0002");
        let WebhookOutcome::Ticketed { ticket, .. } = outcome else { unreachable!() };
        assert_eq!(ticket.source, TicketSource::Refund { order_id: 555, refund_id: 9001 });
        assert_eq!(ticket.total_amount, 60.5);
        assert_eq!(ticket.tax_lines[0].price, 50.0);
        assert_eq!(ticket.tax_lines[0].tax, 10.5);
    }

    #[tokio::test]
    async fn refunds_without_lines_are_discarded() {
        let db = MemoryDatabase::new();
        let handlers = handlers(&db, MockTaxSettings::new(), MockAnnotator::new());
        let body = json!({"id": 9002, "order_id": 555, "created_at": "2025-03-12T08:00:00Z"}).to_string();
        let outcome = handlers.dispatch("refunds/create", SHOP, &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Discarded(_)));
    }

    #[tokio::test]
    async fn bad_deliveries_are_rejected() {
        let db = MemoryDatabase::new();
        let handlers = handlers(&db, MockTaxSettings::new(), MockAnnotator::new());
        assert_eq!(handlers.topics(), vec!["orders/paid", "refunds/create"]);
        let err = handlers.dispatch("orders/cancelled", SHOP, "{}").await.unwrap_err();
        assert!(matches!(err, WebhookError::UnknownTopic(_)));
        let err = handlers.dispatch("orders/paid", SHOP, "{\"id\": 555").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn unknown_tax_settings_defer_the_event() {
        let db = MemoryDatabase::new();
        let mut taxes = MockTaxSettings::new();
        taxes.expect_fetch_taxes_included().returning(|_| Err(PlatformError("503 Service Unavailable".into())));
        let handlers = handlers(&db, taxes, MockAnnotator::new());
        let err = handlers.dispatch("orders/paid", SHOP, &order_body("")).await.unwrap_err();
        assert!(matches!(err, WebhookError::StoreConfigError(_)));
        assert_eq!(err.status_code(), 503);
        assert!(db.tickets().is_empty());
    }
}

mod reporting {
    use chrono::{TimeZone, Utc};
    use ticket_engine::{
        db_types::{ReportStatus, TaxLine, TicketRequest, TicketSource},
        test_utils::MemoryDatabase,
        traits::{TransportError, TransportResponse},
        ReportingApi,
        TicketNumberGenerator,
    };

    use super::mocks::MockTransport;

    async fn march_sale(db: &MemoryDatabase) {
        let request = TicketRequest {
            source: TicketSource::Order { order_id: 555 },
            created_at: Utc.with_ymd_and_hms(2025, 3, 10, 10, 15, 0).unwrap(),
            total_amount: 60.5,
            currency: "EUR".into(),
            tax_lines: vec![TaxLine { rate: 0.21, price: 50.0, tax: 10.5, currency: "EUR".into() }],
        };
        TicketNumberGenerator::new(db.clone()).find_or_generate_ticket(request).await.unwrap();
    }

    #[tokio::test]
    async fn reports_are_posted_with_their_identifier() {
        let db = MemoryDatabase::new();
        march_sale(&db).await;
        let mut erp = MockTransport::new();
        erp.expect_post_report()
            .withf(|report| report.identifier() == Some("1"))
            .times(1)
            .returning(|_| Ok(TransportResponse::new(201, "Created")));
        let reporting = ReportingApi::new(db.clone(), erp);
        let result = reporting.send_report(2025, 3).await.unwrap();
        assert!(result.success);
        assert_eq!(result.status_code, Some(201));
        assert_eq!(result.response_text.as_deref(), Some("Created"));
        let report = reporting.find_report(2025, 3).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.retry_count, 0);
    }

    #[tokio::test]
    async fn unreachable_erp_is_recorded_as_a_failure() {
        let db = MemoryDatabase::new();
        march_sale(&db).await;
        let mut erp = MockTransport::new();
        erp.expect_post_report().times(1).returning(|_| Err(TransportError("connection refused".into())));
        let reporting = ReportingApi::new(db.clone(), erp);
        let result = reporting.send_report(2025, 3).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status_code, None);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        let report = reporting.find_report(2025, 3).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Failure);
        assert_eq!(report.retry_count, 1);
        assert_eq!(report.error.as_deref(), Some("connection refused"));
    }
}

use shared::domain::{Customer, CustomerId, InvoiceStatus};
use storage::{InvoiceChanges, InvoiceStore, NewInvoice, Storage};

#[tokio::test]
async fn invoice_create_update_delete_through_store_trait() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .insert_customer(&Customer {
            id: CustomerId::new("c1"),
            name: "Evil Rabbit".into(),
            email: "evil@rabbit.com".into(),
            image_url: "/customers/evil-rabbit.png".into(),
        })
        .await
        .expect("customer");

    let store: &dyn InvoiceStore = &storage;
    let id = store
        .insert_invoice(&NewInvoice {
            customer_id: CustomerId::new("c1"),
            amount_in_cents: 15795,
            status: InvoiceStatus::Pending,
            date: "2022-12-06".into(),
        })
        .await
        .expect("insert");

    let affected = store
        .update_invoice(
            &id,
            &InvoiceChanges {
                customer_id: CustomerId::new("c1"),
                amount_in_cents: 20348,
                status: InvoiceStatus::Paid,
            },
        )
        .await
        .expect("update");
    assert_eq!(affected, 1);

    assert_eq!(store.delete_invoice(&id).await.expect("delete"), 1);
    assert_eq!(store.delete_invoice(&id).await.expect("second delete"), 0);
    assert!(storage
        .fetch_invoice_by_id(&id)
        .await
        .expect("fetch")
        .is_none());
}

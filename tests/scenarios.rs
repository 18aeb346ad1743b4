use anyhow::Context;
use farm2kitchen::{
    RemoteError, Storefront, ValidationError,
    account::Registration,
    error::is_unauthorized,
    moderation::TransitionPolicy,
    product::ProductDraft,
    service::StoreService,
    session::{Session, SessionContext},
    types::{ApprovalStatus, Category, Role, Unit},
};
use sled::open;
use std::sync::Arc;

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

// Each test opens its own sled db under a temp dir; sled locks the directory.
fn open_service(name: &str) -> anyhow::Result<(TempDir, StoreService)> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join(name))?;
    let service = StoreService::new(Arc::new(db))?;
    Ok((temp_dir, service))
}

fn admin(service: &StoreService) -> anyhow::Result<Session> {
    service.register_admin(
        Registration::new()
            .set_name("Admin")
            .set_email("admin@farm2kitchen.in")
            .set_password("admin123"),
    )?;
    service.login("admin@farm2kitchen.in", "admin123")
}

fn shopper(service: &StoreService, email: &str) -> anyhow::Result<Session> {
    service.register(
        Registration::new()
            .set_name("Shopper")
            .set_email(email)
            .set_password("shopper1")
            .set_contact("9123456780")
            .set_address("Pune"),
    )?;
    service.login(email, "shopper1")
}

fn farmer_form(email: &str) -> Registration {
    Registration::new()
        .set_name("Asha")
        .set_email(email)
        .set_password("harvest")
        .set_contact("9876543210")
        .set_address("Nashik")
        .set_document_ref("uploads/land-record.pdf")
}

/// Registers a farmer, approves them and logs them in.
fn approved_farmer(service: &StoreService, admin: &Session, email: &str) -> anyhow::Result<Session> {
    let farmer = service.register_farmer(farmer_form(email))?;
    service.set_farmer_status(admin, &farmer.id, ApprovalStatus::Approved)?;
    service.login(email, "harvest")
}

fn draft(name: &str, price: u64, stock: u32) -> ProductDraft {
    ProductDraft::new()
        .set_name(name)
        .set_description("Grown without pesticides")
        .set_category(Category::Vegetables)
        .set_market_price(price + 10)
        .set_our_price(price)
        .set_stock(stock)
        .set_unit(Unit::Kg)
        .set_image_url(format!("uploads/{name}.jpg"))
}

#[test]
fn farmer_login_waits_for_approval() -> anyhow::Result<()> {
    let (_dir, service) = open_service("farmer_login.db")?;
    let admin = admin(&service)?;

    let farmer = service.register_farmer(farmer_form("asha@farm.in"))?;
    assert_eq!(farmer.farmer_status(), Some(ApprovalStatus::Pending));

    // correct credentials, still refused
    let err = service.login("asha@farm.in", "harvest").unwrap_err();
    assert_eq!(err.downcast_ref::<RemoteError>(), Some(&RemoteError::PendingApproval));
    assert!(err.to_string().contains("pending approval"));

    let farmer = service
        .set_farmer_status(&admin, &farmer.id, ApprovalStatus::Approved)
        .context("approving farmer")?;
    assert!(farmer.is_verified());

    let session = service.login("asha@farm.in", "harvest")?;
    assert_eq!(session.role, Role::Farmer);

    // revoking approval also ends the farmer's live session
    let farmer = service.set_farmer_status(&admin, &farmer.id, ApprovalStatus::Rejected)?;
    assert!(!farmer.is_verified());
    let err = service.all_products(&session).unwrap_err();
    assert!(is_unauthorized(&err));

    Ok(())
}

#[test]
fn wrong_password_is_unauthorized() -> anyhow::Result<()> {
    let (_dir, service) = open_service("wrong_password.db")?;
    shopper(&service, "ravi@example.com")?;

    let err = service.login("ravi@example.com", "shopper2").unwrap_err();
    assert!(is_unauthorized(&err));

    let err = service.login("nobody@example.com", "shopper1").unwrap_err();
    assert!(is_unauthorized(&err));

    Ok(())
}

#[test]
fn submitted_product_waits_for_moderation() -> anyhow::Result<()> {
    let (_dir, service) = open_service("moderation.db")?;
    let admin = admin(&service)?;
    let farmer = approved_farmer(&service, &admin, "asha@farm.in")?;
    let shopper = shopper(&service, "ravi@example.com")?;

    let product = service.submit_product(&farmer, draft("tomato", 40, 20))?;
    assert_eq!(product.status(), ApprovalStatus::Pending);
    assert!(service.approved_products()?.is_empty());

    // the farmer sees their own pending product, the shopper does not
    assert_eq!(service.all_products(&farmer)?.len(), 1);
    assert!(service.all_products(&shopper)?.is_empty());
    assert_eq!(service.all_products(&admin)?.len(), 1);

    // only admins moderate
    let err = service
        .set_product_status(&farmer, &product.id, ApprovalStatus::Approved)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::Forbidden(_))));

    let approved = service.set_product_status(&admin, &product.id, ApprovalStatus::Approved)?;
    assert_eq!(approved.stock, product.stock);
    assert_eq!(approved.our_price, product.our_price);

    let listed = service.approved_products()?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, product.id);

    Ok(())
}

#[test]
fn shoppers_cannot_submit_products() -> anyhow::Result<()> {
    let (_dir, service) = open_service("shopper_submit.db")?;
    let shopper = shopper(&service, "ravi@example.com")?;

    let err = service.submit_product(&shopper, draft("tomato", 40, 20)).unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::Forbidden(_))));

    Ok(())
}

#[test]
fn cart_flow_and_checkout() -> anyhow::Result<()> {
    let (_dir, service) = open_service("cart_flow.db")?;
    let admin = admin(&service)?;
    let farmer = approved_farmer(&service, &admin, "asha@farm.in")?;
    let shopper = shopper(&service, "ravi@example.com")?;

    let a = service.submit_product(&farmer, draft("tomato", 4_000, 10))?;
    let b = service.submit_product(&farmer, draft("onion", 1_500, 10))?;

    // pending products cannot be added
    let err = service.add_to_cart(&shopper, &a.id).unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::Conflict(_))));

    service.set_product_status(&admin, &a.id, ApprovalStatus::Approved)?;
    service.set_product_status(&admin, &b.id, ApprovalStatus::Approved)?;

    // a cart starts out empty and is created on first add
    assert!(service.cart(&shopper)?.is_empty());

    service.add_to_cart(&shopper, &a.id)?;
    let view = service.add_to_cart(&shopper, &a.id)?;
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 2);

    service.add_to_cart(&shopper, &b.id)?;
    let view = service.update_cart(&shopper, &b.id, 3)?;
    assert_eq!(view.total_amount, 12_500);

    let order = service.checkout(&shopper)?;
    assert_eq!(order.total_amount, 12_500);
    assert_eq!(order.lines.len(), 2);

    let view = service.remove_from_cart(&shopper, &b.id)?;
    assert_eq!(view.total_amount, 8_000);

    let view = service.update_cart(&shopper, &a.id, 0)?;
    assert!(view.is_empty());

    let err = service.checkout(&shopper).unwrap_err();
    assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::EmptyCart));

    Ok(())
}

#[test]
fn unknown_product_leaves_cart_unchanged() -> anyhow::Result<()> {
    let (_dir, service) = open_service("unknown_product.db")?;
    let admin = admin(&service)?;
    let farmer = approved_farmer(&service, &admin, "asha@farm.in")?;
    let shopper = shopper(&service, "ravi@example.com")?;

    let a = service.submit_product(&farmer, draft("tomato", 40, 10))?;
    service.set_product_status(&admin, &a.id, ApprovalStatus::Approved)?;
    let before = service.add_to_cart(&shopper, &a.id)?;

    for err in [
        service.add_to_cart(&shopper, "product_missing").unwrap_err(),
        service.update_cart(&shopper, "product_missing", 2).unwrap_err(),
        service.remove_from_cart(&shopper, "product_missing").unwrap_err(),
    ] {
        assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::NotFound(_))));
    }
    assert_eq!(service.cart(&shopper)?, before);

    Ok(())
}

#[test]
fn checkout_sees_price_and_stock_changes() -> anyhow::Result<()> {
    let (_dir, service) = open_service("checkout_changes.db")?;
    let admin = admin(&service)?;
    let farmer = approved_farmer(&service, &admin, "asha@farm.in")?;
    let shopper = shopper(&service, "ravi@example.com")?;

    let a = service.submit_product(&farmer, draft("tomato", 40, 2))?;
    service.set_product_status(&admin, &a.id, ApprovalStatus::Approved)?;
    service.add_to_cart(&shopper, &a.id)?;
    service.update_cart(&shopper, &a.id, 3)?;

    // 3 requested, 2 in stock
    let err = service.checkout(&shopper).unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::Conflict(_))));

    service.update_cart(&shopper, &a.id, 2)?;
    service.set_product_status(&admin, &a.id, ApprovalStatus::Rejected)?;
    let err = service.checkout(&shopper).unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::Conflict(_))));

    Ok(())
}

#[test]
fn monotone_policy_makes_decisions_final() -> anyhow::Result<()> {
    let (_dir, service) = open_service("monotone.db")?;
    let service = service.with_policy(TransitionPolicy::Monotone);
    let admin = admin(&service)?;

    let farmer = service.register_farmer(farmer_form("asha@farm.in"))?;
    service.set_farmer_status(&admin, &farmer.id, ApprovalStatus::Rejected)?;

    let err = service
        .set_farmer_status(&admin, &farmer.id, ApprovalStatus::Approved)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::InvalidTransition { .. })
    ));

    // re-asserting the same decision is fine
    service.set_farmer_status(&admin, &farmer.id, ApprovalStatus::Rejected)?;

    Ok(())
}

#[test]
fn admin_manages_users() -> anyhow::Result<()> {
    let (_dir, service) = open_service("manage_users.db")?;
    let admin = admin(&service)?;
    let shopper = shopper(&service, "ravi@example.com")?;
    service.register_farmer(farmer_form("asha@farm.in"))?;

    let err = service.all_users(&shopper).unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::Forbidden(_))));

    let users = service.all_users(&admin)?;
    assert_eq!(users.len(), 3);
    assert_eq!(users.iter().filter(|u| u.is_farmer()).count(), 1);

    service.delete_user(&admin, &shopper.user_id)?;
    assert_eq!(service.all_users(&admin)?.len(), 2);

    // the deleted user's session is gone and the email is free again
    let mut ctx = SessionContext::new();
    ctx.begin(shopper);
    let result = ctx.run(|s| service.cart(s));
    assert!(result.is_err());
    assert!(!ctx.is_active());

    shopper_again(&service)?;

    let err = service.delete_user(&admin, "user_missing").unwrap_err();
    assert!(matches!(err.downcast_ref::<RemoteError>(), Some(RemoteError::NotFound(_))));

    Ok(())
}

fn shopper_again(service: &StoreService) -> anyhow::Result<()> {
    shopper(service, "ravi@example.com").map(|_| ())
}

#[test]
fn store_survives_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let path = temp_dir.path().join("reopen.db");

    {
        let service = StoreService::new(Arc::new(open(&path)?))?;
        shopper(&service, "ravi@example.com")?;
        service.flush()?;
    }

    let service = StoreService::new(Arc::new(open(&path)?))?;
    let session = service.login("ravi@example.com", "shopper1")?;
    assert_eq!(session.role, Role::User);

    Ok(())
}

#[test]
fn concurrent_cart_adds_are_all_kept() -> anyhow::Result<()> {
    let (_dir, service) = open_service("concurrent_cart.db")?;
    let admin = admin(&service)?;
    let farmer = approved_farmer(&service, &admin, "asha@farm.in")?;
    let shopper = shopper(&service, "ravi@example.com")?;

    let rice = service.submit_product(&farmer, draft("rice", 8_000, 1_000))?;
    service.set_product_status(&admin, &rice.id, ApprovalStatus::Approved)?;

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    service.add_to_cart(&shopper, &rice.id).unwrap();
                }
            });
        }
    });

    let view = service.cart(&shopper)?;
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 400);
    assert_eq!(view.total_amount, 400 * 8_000);

    Ok(())
}

#[test]
fn concurrent_status_changes_keep_verification_paired() -> anyhow::Result<()> {
    let (_dir, service) = open_service("concurrent_status.db")?;
    let admin = admin(&service)?;
    let farmer = service.register_farmer(farmer_form("asha@farm.in"))?;

    std::thread::scope(|scope| {
        for status in [ApprovalStatus::Approved, ApprovalStatus::Rejected] {
            let (service, admin, farmer_id) = (&service, &admin, &farmer.id);
            scope.spawn(move || {
                for _ in 0..25 {
                    service.set_farmer_status(admin, farmer_id, status).unwrap();
                }
            });
        }
    });

    let stored = service
        .all_users(&admin)?
        .into_iter()
        .find(|u| u.id == farmer.id)
        .context("farmer still listed")?;
    assert_eq!(
        stored.is_verified(),
        stored.farmer_status() == Some(ApprovalStatus::Approved)
    );

    Ok(())
}

#[test]
fn revoked_farmer_session_is_cleared() -> anyhow::Result<()> {
    let (_dir, service) = open_service("revoked_farmer.db")?;
    let admin = admin(&service)?;
    let farmer = service.register_farmer(farmer_form("asha@farm.in"))?;
    service.set_farmer_status(&admin, &farmer.id, ApprovalStatus::Approved)?;

    let mut ctx = SessionContext::new();
    ctx.begin(service.login("asha@farm.in", "harvest")?);
    ctx.run(|s| service.submit_product(s, draft("okra", 6_000, 5)))?;

    service.set_farmer_status(&admin, &farmer.id, ApprovalStatus::Rejected)?;

    let err = ctx.run(|s| service.all_products(s)).unwrap_err();
    assert!(is_unauthorized(&err));
    assert!(!ctx.is_active());

    // the next call is refused locally, before reaching the store
    let err = ctx.run(|s| service.all_products(s)).unwrap_err();
    assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::NotLoggedIn));

    // logging in again is refused while the farmer is rejected
    let err = service.login("asha@farm.in", "harvest").unwrap_err();
    assert_eq!(err.downcast_ref::<RemoteError>(), Some(&RemoteError::PendingApproval));

    Ok(())
}

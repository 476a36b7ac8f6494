use super::*;

fn config() -> AuthConfig {
    AuthConfig {
        secret: "devsecret".into(),
        issuer: "gds-wizard".into(),
        ttl_seconds: 60,
    }
}

#[test]
fn minted_token_verifies_to_user_and_organization() {
    let cfg = config();
    let org = OrganizationId::from("2295c698-afdc-4aaf-9443-85a4515217e3");
    let token = mint_token(&cfg, "leopold.wentzel@gmail.com", Some(&org)).expect("token");

    let identity = verify_token(&cfg, &token).expect("identity");
    assert_eq!(identity.user_id, "leopold.wentzel@gmail.com");
    assert_eq!(identity.org_id, org);
}

#[test]
fn token_without_organization_is_unauthorized() {
    let cfg = config();
    let token = mint_token(&cfg, "alice", None).expect("token");

    let err = verify_token(&cfg, &token).expect_err("no org");
    assert_eq!(err.code, ErrorCode::Unauthorized);
    assert_eq!(
        err.message,
        "missing claims info, try logging out and logging back in"
    );
}

#[test]
fn token_from_another_issuer_or_secret_is_rejected() {
    let cfg = config();
    let org = OrganizationId::from("acme");

    let foreign_issuer = AuthConfig {
        issuer: "someone-else".into(),
        ..config()
    };
    let token = mint_token(&foreign_issuer, "alice", Some(&org)).expect("token");
    assert!(verify_token(&cfg, &token).is_err());

    let foreign_secret = AuthConfig {
        secret: "othersecret".into(),
        ..config()
    };
    let token = mint_token(&foreign_secret, "alice", Some(&org)).expect("token");
    assert!(verify_token(&cfg, &token).is_err());
}

#[test]
fn expired_token_is_rejected() {
    let cfg = AuthConfig {
        ttl_seconds: -3600,
        ..config()
    };
    let token = mint_token(&cfg, "alice", Some(&OrganizationId::from("acme"))).expect("token");
    let err = verify_token(&config(), &token).expect_err("expired");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

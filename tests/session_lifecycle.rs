use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tessera::auth::{
    credentials::hash_password, AuthConfig, AuthError, AuthService, Collaborators, Identity,
    LogNotificationGateway, LoginRequest, MemoryRevocationStore, MemoryStaffProfiles,
    MemoryUserDirectory, RegistrationRequest, Role, TracingAuditSink, UserDirectory,
    FORGOT_PASSWORD_MESSAGE,
};
use uuid::Uuid;

const PHONE: &str = "+250788000111";
const PASSWORD: &str = "Passw0rd!";

struct Harness {
    auth: AuthService,
    users: Arc<MemoryUserDirectory>,
    staff: Arc<MemoryStaffProfiles>,
}

fn harness() -> Result<Harness> {
    let users = Arc::new(MemoryUserDirectory::new());
    let staff = Arc::new(MemoryStaffProfiles::new());
    let config = AuthConfig::new(
        SecretString::from("integration-access-secret"),
        SecretString::from("integration-refresh-secret"),
    )
    .with_store_timeout(Duration::from_millis(500));
    let auth = AuthService::new(
        config,
        Collaborators {
            users: users.clone(),
            staff_profiles: staff.clone(),
            revocations: Arc::new(MemoryRevocationStore::new()),
            notifications: Arc::new(LogNotificationGateway),
            audit: Arc::new(TracingAuditSink),
        },
    )?;
    Ok(Harness { auth, users, staff })
}

fn identity(
    n: usize,
    password_hash: &str,
    role: Role,
    is_verified: bool,
    is_active: bool,
) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        email: Some(format!("user{n}@example.org")),
        phone: Some(format!("+25078800{n:04}")),
        password_hash: password_hash.to_string(),
        full_name: format!("User {n}"),
        role,
        language: "en".to_string(),
        is_verified,
        verification_code: None,
        verification_code_expires_at: None,
        verified_at: None,
        is_active,
        deactivated_at: None,
        reset_token: None,
        reset_token_expires_at: None,
        last_login_at: None,
        created_at: Utc::now(),
    }
}

fn login_with_phone(phone: &str) -> LoginRequest {
    LoginRequest {
        phone: Some(phone.to_string()),
        password: PASSWORD.to_string(),
        ..LoginRequest::default()
    }
}

fn login_with_email(email: &str) -> LoginRequest {
    LoginRequest {
        email: Some(email.to_string()),
        password: PASSWORD.to_string(),
        ..LoginRequest::default()
    }
}

async fn seeded_donor(harness: &Harness) -> Result<Identity> {
    let donor = identity(1, &hash_password(PASSWORD)?, Role::Donor, true, true);
    harness.users.insert(&donor).await?;
    Ok(donor)
}

async fn stored(harness: &Harness, phone: &str) -> Result<Identity> {
    harness
        .users
        .find_by_phone(phone)
        .await?
        .context("identity should exist")
}

#[tokio::test]
async fn login_gate_follows_account_state() -> Result<()> {
    let harness = harness()?;
    let password_hash = hash_password(PASSWORD)?;

    let mut n = 0;
    for role in [Role::Donor, Role::Beneficiary, Role::StaffAdmin] {
        for is_verified in [false, true] {
            for is_active in [false, true] {
                n += 1;
                let account = identity(n, &password_hash, role, is_verified, is_active);
                harness.users.insert(&account).await?;

                let email = account.email.clone().context("seeded with email")?;
                let result = harness.auth.sessions().login(login_with_email(&email)).await;

                let allowed = is_active && (is_verified || role.is_staff());
                match result {
                    Ok(outcome) => {
                        assert!(allowed, "{role} verified={is_verified} active={is_active}");
                        assert_eq!(outcome.user.id, account.id);
                    }
                    Err(err) => {
                        assert!(!allowed, "{role} verified={is_verified} active={is_active}");
                        let expected = if !is_verified && !role.is_staff() {
                            AuthError::AccountNotVerified
                        } else {
                            AuthError::AccountInactive
                        };
                        assert_eq!(err, expected);
                    }
                }
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn staff_login_signals_missing_profile() -> Result<()> {
    let harness = harness()?;
    let admin = identity(7, &hash_password(PASSWORD)?, Role::StaffAdmin, false, true);
    harness.users.insert(&admin).await?;
    let phone = admin.phone.clone().context("seeded with phone")?;

    let outcome = harness.auth.sessions().login(login_with_phone(&phone)).await?;
    assert!(outcome.requires_staff_profile);

    harness.staff.insert(admin.id).await;
    let outcome = harness.auth.sessions().login(login_with_phone(&phone)).await?;
    assert!(!outcome.requires_staff_profile);
    Ok(())
}

#[tokio::test]
async fn register_verify_then_login() -> Result<()> {
    let harness = harness()?;

    let registered = harness
        .auth
        .accounts()
        .register(RegistrationRequest {
            phone: Some(PHONE.to_string()),
            password: PASSWORD.to_string(),
            full_name: "Ada Donor".to_string(),
            ..RegistrationRequest::default()
        })
        .await?;
    assert!(registered.verification_required);
    assert!(!registered.tokens.access_token.is_empty());
    assert!(!registered.tokens.refresh_token.is_empty());

    let early = harness.auth.sessions().login(login_with_phone(PHONE)).await;
    assert_eq!(early.err(), Some(AuthError::AccountNotVerified));

    let code = stored(&harness, PHONE)
        .await?
        .verification_code
        .context("code issued at registration")?;
    let profile = harness.auth.accounts().verify_account(&code).await?;
    assert!(profile.is_verified);

    let outcome = harness.auth.sessions().login(login_with_phone(PHONE)).await?;
    assert_eq!(outcome.user.id, registered.user.id);
    assert!(!outcome.requires_verification);
    Ok(())
}

#[tokio::test]
async fn expired_code_is_distinct_from_unknown_code() -> Result<()> {
    let harness = harness()?;
    harness
        .auth
        .accounts()
        .register(RegistrationRequest {
            phone: Some(PHONE.to_string()),
            password: PASSWORD.to_string(),
            full_name: "Late Verifier".to_string(),
            ..RegistrationRequest::default()
        })
        .await?;

    let account = stored(&harness, PHONE).await?;
    let code = account.verification_code.clone().context("code issued")?;
    harness
        .users
        .set_verification_code(account.id, &code, Utc::now() - ChronoDuration::minutes(1))
        .await?;

    let expired = harness.auth.accounts().verify_account(&code).await;
    assert_eq!(expired.err(), Some(AuthError::CodeExpired));

    let unknown = harness.auth.accounts().verify_account("000000").await;
    assert!(matches!(unknown, Err(AuthError::NotFound(_))));

    // A resend overwrites the expired code.
    harness
        .auth
        .accounts()
        .resend_verification_code(PHONE)
        .await?;
    let fresh = stored(&harness, PHONE)
        .await?
        .verification_code
        .context("new code issued")?;
    assert!(harness.auth.accounts().verify_account(&fresh).await?.is_verified);
    Ok(())
}

#[tokio::test]
async fn refresh_token_rotates_exactly_once() -> Result<()> {
    let harness = harness()?;
    let donor = seeded_donor(&harness).await?;
    let phone = donor.phone.clone().context("seeded with phone")?;

    let first = harness.auth.sessions().login(login_with_phone(&phone)).await?;
    let second = harness
        .auth
        .sessions()
        .refresh(&first.tokens.refresh_token)
        .await?;

    let replay = harness
        .auth
        .sessions()
        .refresh(&first.tokens.refresh_token)
        .await;
    assert_eq!(replay.err(), Some(AuthError::TokenInvalid));

    harness
        .auth
        .sessions()
        .refresh(&second.refresh_token)
        .await?;
    let second_replay = harness.auth.sessions().refresh(&second.refresh_token).await;
    assert_eq!(second_replay.err(), Some(AuthError::TokenInvalid));
    Ok(())
}

#[tokio::test]
async fn logout_revokes_every_session() -> Result<()> {
    let harness = harness()?;
    let donor = seeded_donor(&harness).await?;
    let phone = donor.phone.clone().context("seeded with phone")?;
    let sessions = harness.auth.sessions();

    let laptop = sessions.login(login_with_phone(&phone)).await?;
    let phone_app = sessions.login(login_with_phone(&phone)).await?;

    let identity = sessions.authenticate(&laptop.tokens.access_token).await?;
    assert_eq!(identity.id, donor.id);

    let revoked = sessions
        .logout(
            donor.id,
            &laptop.tokens.access_token,
            Some(&laptop.tokens.refresh_token),
        )
        .await;
    assert_eq!(revoked, 2);

    assert_eq!(
        sessions.authenticate(&laptop.tokens.access_token).await.err(),
        Some(AuthError::TokenInvalid)
    );
    assert_eq!(
        sessions.refresh(&laptop.tokens.refresh_token).await.err(),
        Some(AuthError::TokenInvalid)
    );
    assert_eq!(
        sessions.refresh(&phone_app.tokens.refresh_token).await.err(),
        Some(AuthError::TokenInvalid)
    );
    Ok(())
}

#[tokio::test]
async fn password_reset_ends_existing_sessions() -> Result<()> {
    let harness = harness()?;
    let donor = seeded_donor(&harness).await?;
    let phone = donor.phone.clone().context("seeded with phone")?;
    let email = donor.email.clone().context("seeded with email")?;

    let before = harness.auth.sessions().login(login_with_phone(&phone)).await?;

    let message = harness
        .auth
        .accounts()
        .forgot_password(Some(&email), None)
        .await?;
    assert_eq!(message, FORGOT_PASSWORD_MESSAGE);

    let token = stored(&harness, &phone)
        .await?
        .reset_token
        .context("reset token issued")?;
    harness
        .auth
        .accounts()
        .reset_password(&token, "N3w-Passw0rd", "N3w-Passw0rd")
        .await?;

    let stale = harness
        .auth
        .sessions()
        .refresh(&before.tokens.refresh_token)
        .await;
    assert_eq!(stale.err(), Some(AuthError::TokenInvalid));

    let old_password = harness.auth.sessions().login(login_with_phone(&phone)).await;
    assert_eq!(old_password.err(), Some(AuthError::InvalidCredentials));

    let reused = harness
        .auth
        .accounts()
        .reset_password(&token, "An0ther-pass", "An0ther-pass")
        .await;
    assert_eq!(reused.err(), Some(AuthError::TokenInvalid));
    Ok(())
}

#[tokio::test]
async fn forgot_password_does_not_reveal_accounts() -> Result<()> {
    let harness = harness()?;
    seeded_donor(&harness).await?;

    let known = harness
        .auth
        .accounts()
        .forgot_password(Some("user1@example.org"), None)
        .await?;
    let unknown = harness
        .auth
        .accounts()
        .forgot_password(Some("nobody@example.org"), Some("+250788999999"))
        .await?;
    assert_eq!(known, unknown);
    Ok(())
}

#[tokio::test]
async fn deactivated_account_loses_access_immediately() -> Result<()> {
    let harness = harness()?;
    let donor = seeded_donor(&harness).await?;
    let admin = identity(9, &donor.password_hash, Role::StaffAdmin, true, true);
    harness.users.insert(&admin).await?;
    let phone = donor.phone.clone().context("seeded with phone")?;

    let session = harness.auth.sessions().login(login_with_phone(&phone)).await?;

    let profile = harness
        .auth
        .accounts()
        .set_activation(&admin, donor.id, false)
        .await?;
    assert!(!profile.is_active);

    assert_eq!(
        harness
            .auth
            .sessions()
            .authenticate(&session.tokens.access_token)
            .await
            .err(),
        Some(AuthError::AccountInactive)
    );
    assert!(harness
        .auth
        .sessions()
        .refresh(&session.tokens.refresh_token)
        .await
        .is_err());
    Ok(())
}

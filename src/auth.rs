use crate::error::{AppError, Result};
use crate::model::{Role, User};
use crate::repository::GroupRepository;
use crate::retry;
use crate::store::AuthSession;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

pub const MIN_PASSWORD_LEN: usize = 6;
const CODE_ATTEMPTS: usize = 20;

/// Where the host should navigate after signing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    TeacherDashboard,
    StudentDashboard,
}

impl From<Role> for Route {
    fn from(role: Role) -> Self {
        match role {
            Role::Teacher => Route::TeacherDashboard,
            Role::Student => Route::StudentDashboard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub student_code: Option<String>,
    pub route: Route,
}

impl Session {
    fn from_user(user: User) -> Self {
        Self {
            route: Route::from(user.role),
            user_id: user.id,
            email: user.email,
            role: user.role,
            student_code: user.student_code,
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "please enter email and password".into(),
        ));
    }
    Ok(())
}

/// Creates the account and writes the profile. Students get a short code
/// that no other student currently holds. If the profile cannot be written
/// the account is deleted again so the email stays usable. Signing up never
/// leaves anyone signed in: the store is signed out afterwards and the
/// caller signs in explicitly.
pub async fn sign_up(
    repo: &GroupRepository,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User> {
    validate_credentials(email, password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    let store = repo.store();
    let account = retry::write(repo.policy(), "sign up", store.sign_up(email, password)).await?;
    let finished = write_profile(repo, &account, role).await;
    if let Err(e) = &finished {
        tracing::warn!("profile for {} not written, removing account: {}", account.uid, e);
        let undo = store.delete_account(&account);
        if let Err(del) = retry::write(repo.policy(), "delete account", undo).await {
            tracing::error!("account {} left without a profile: {}", account.uid, del);
        }
    }
    store.sign_out();
    finished
}

async fn write_profile(repo: &GroupRepository, account: &AuthSession, role: Role) -> Result<User> {
    let student_code = match role {
        Role::Student => {
            let taken: HashSet<String> = repo
                .all_users()
                .await?
                .into_iter()
                .filter_map(|u| u.student_code)
                .collect();
            Some(unique_code(&taken, &mut rand::thread_rng())?)
        }
        Role::Teacher => None,
    };

    let user = User {
        id: account.uid.clone(),
        email: account.email.clone(),
        role,
        student_code,
    };
    repo.put_user(&user).await?;
    tracing::info!("signed up {} as {}", user.id, role);
    Ok(user)
}

pub async fn sign_in(repo: &GroupRepository, email: &str, password: &str) -> Result<Session> {
    validate_credentials(email, password)?;
    let store = repo.store();
    let account = retry::write(repo.policy(), "sign in", store.sign_in(email, password)).await?;
    let Some(user) = repo.get_user(&account.uid).await? else {
        store.sign_out();
        return Err(AppError::NotFound(format!("profile for {}", account.uid)));
    };
    tracing::info!("signed in {} as {}", user.id, user.role);
    Ok(Session::from_user(user))
}

pub fn sign_out(repo: &GroupRepository) {
    repo.store().sign_out();
}

/// Two uppercase letters then two digits, e.g. `QX07`.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut s = String::with_capacity(4);
    for _ in 0..2 {
        s.push(rng.gen_range(b'A'..=b'Z') as char);
    }
    for _ in 0..2 {
        s.push(rng.gen_range(b'0'..=b'9') as char);
    }
    s
}

pub fn unique_code<R: Rng + ?Sized>(taken: &HashSet<String>, rng: &mut R) -> Result<String> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(rng);
        if !taken.contains(&code) {
            return Ok(code);
        }
        tracing::debug!("student code {} already taken, regenerating", code);
    }
    Err(AppError::Validation(
        "could not allocate a free student code".into(),
    ))
}

pub fn is_valid_code(code: &str) -> bool {
    let b = code.as_bytes();
    b.len() == 4
        && b[..2].iter().all(u8::is_ascii_uppercase)
        && b[2..].iter().all(u8::is_ascii_digit)
}

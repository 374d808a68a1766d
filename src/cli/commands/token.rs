use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::cli::OutputFormat;

pub fn handle(user: String, user_id: Option<Uuid>, output_format: OutputFormat) -> anyhow::Result<()> {
    if user.trim().is_empty() {
        anyhow::bail!("user must not be empty");
    }

    let claims = Claims::new(user, user_id)?;
    let expires = claims.exp;
    let token = generate_jwt(claims)?;

    match output_format {
        OutputFormat::Json => println!("{}", json!({ "token": token, "exp": expires })),
        OutputFormat::Text => println!("{}", token),
    }

    Ok(())
}

//! Validate and sanitize commands - identifier checks without touching the cache

use crate::cli::args::{SanitizeArgs, ValidateArgs};
use crate::error::{TierError, TierResult};
use crate::validate::{sanitize_for_filesystem, validate_model_id};
use console::style;

/// Execute the validate command
pub async fn execute(args: ValidateArgs) -> TierResult<()> {
    validate_model_id(&args.model_id, &args.provider)
        .map_err(|reason| TierError::from_rejection(&args.model_id, reason))?;

    println!(
        "{} {} is a valid {} identifier",
        style("✓").green(),
        args.model_id,
        args.provider.to_ascii_lowercase()
    );
    Ok(())
}

/// Execute the sanitize command
pub async fn sanitize(args: SanitizeArgs) -> TierResult<()> {
    println!("{}", sanitize_for_filesystem(&args.name));
    Ok(())
}

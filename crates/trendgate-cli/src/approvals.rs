//! Operator review from the terminal, using the same gate as the HTTP API.

use clap::Subcommand;
use trendgate_core::ApprovalState;
use trendgate_db::DbError;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum ApprovalCommands {
    /// List pending approvals, oldest first
    Pending {
        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Approve a pending prediction for publication
    Approve {
        approval_id: Uuid,
        /// Operator recorded on the decision
        #[arg(long, env = "TRENDGATE_OPERATOR_ID")]
        operator: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject a pending prediction
    Reject {
        approval_id: Uuid,
        /// Operator recorded on the decision
        #[arg(long, env = "TRENDGATE_OPERATOR_ID")]
        operator: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

/// # Errors
///
/// Returns an error if the store query fails or the record is unknown or
/// already decided.
pub(crate) async fn run_approvals(
    pool: &sqlx::PgPool,
    command: ApprovalCommands,
) -> anyhow::Result<()> {
    match command {
        ApprovalCommands::Pending { limit } => list_pending(pool, limit).await,
        ApprovalCommands::Approve {
            approval_id,
            operator,
            notes,
        } => {
            decide(
                pool,
                approval_id,
                ApprovalState::Approved,
                &operator,
                notes.as_deref(),
            )
            .await
        }
        ApprovalCommands::Reject {
            approval_id,
            operator,
            notes,
        } => {
            decide(
                pool,
                approval_id,
                ApprovalState::Rejected,
                &operator,
                notes.as_deref(),
            )
            .await
        }
    }
}

async fn list_pending(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let rows = trendgate_db::list_pending_approvals(pool, limit.clamp(1, 200)).await?;
    if rows.is_empty() {
        println!("no pending approvals");
        return Ok(());
    }

    for row in &rows {
        println!(
            "{}  {:<24} tcs {:>3}  {:<6}  {}  [{}]  {}",
            row.approval_id,
            row.entity_id,
            row.tcs,
            row.tier,
            row.generated_at.format("%Y-%m-%d %H:%M"),
            row.regions.join(","),
            row.drivers.join(", ")
        );
    }
    Ok(())
}

async fn decide(
    pool: &sqlx::PgPool,
    approval_id: Uuid,
    to: ApprovalState,
    operator: &str,
    notes: Option<&str>,
) -> anyhow::Result<()> {
    match trendgate_db::transition_approval(pool, approval_id, to, operator, notes).await {
        Ok(row) => {
            println!("{} {} by {operator}", row.public_id, row.state);
            Ok(())
        }
        Err(DbError::AlreadyProcessed { current_state }) => {
            anyhow::bail!("{approval_id} was already {current_state}; nothing changed")
        }
        Err(DbError::UnknownEntity(id)) => anyhow::bail!("no approval record {id}"),
        Err(e) => Err(e.into()),
    }
}

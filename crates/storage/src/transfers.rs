use ledgerly_core::TransactionId;
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::DbPool;
use crate::error::StorageError;
use crate::transactions::fetch_transaction;

/// Flags both rows as a transfer and links them to each other.
pub async fn mark_as_transfer(
    pool: &DbPool,
    outgoing_id: TransactionId,
    incoming_id: TransactionId,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    link_pair(&mut tx, outgoing_id, incoming_id).await?;
    tx.commit().await?;

    info!(outgoing = %outgoing_id, incoming = %incoming_id, "marked transfer");
    Ok(())
}

/// Marks every pair or none of them.
pub async fn mark_transfers(
    pool: &DbPool,
    pairs: &[(TransactionId, TransactionId)],
) -> Result<usize, StorageError> {
    let mut tx = pool.begin().await?;
    for &(outgoing_id, incoming_id) in pairs {
        link_pair(&mut tx, outgoing_id, incoming_id).await?;
    }
    tx.commit().await?;

    info!(marked = pairs.len(), "marked transfers");
    Ok(pairs.len())
}

async fn link_pair(
    conn: &mut SqliteConnection,
    outgoing_id: TransactionId,
    incoming_id: TransactionId,
) -> Result<(), StorageError> {
    if outgoing_id == incoming_id {
        return Err(StorageError::InvalidTransferPair(
            "a transaction cannot be paired with itself".to_string(),
        ));
    }

    let outgoing = fetch_transaction(&mut *conn, outgoing_id).await?;
    let incoming = fetch_transaction(&mut *conn, incoming_id).await?;

    if outgoing.account_id == incoming.account_id {
        return Err(StorageError::InvalidTransferPair(
            "both sides belong to the same account".to_string(),
        ));
    }
    if outgoing.amount_cents >= 0 || incoming.amount_cents <= 0 {
        return Err(StorageError::InvalidTransferPair(
            "outgoing must be negative and incoming positive".to_string(),
        ));
    }
    for (side, other) in [(&outgoing, incoming_id), (&incoming, outgoing_id)] {
        if matches!(side.linked_transaction_id, Some(linked) if linked != other) {
            return Err(StorageError::InvalidTransferPair(format!(
                "transaction {} is already linked to {}",
                side.id,
                side.linked_transaction_id.map(|l| l.0).unwrap_or_default()
            )));
        }
    }

    for (id, linked) in [(outgoing_id, incoming_id), (incoming_id, outgoing_id)] {
        sqlx::query("UPDATE transactions SET is_transfer = 1, linked_transaction_id = ? WHERE id = ?")
            .bind(linked.0)
            .bind(id.0)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Reverses [`mark_as_transfer`] on the row and its counterpart.
pub async fn unmark_transfer(pool: &DbPool, id: TransactionId) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    let row = fetch_transaction(&mut tx, id).await?;

    sqlx::query(
        "UPDATE transactions SET is_transfer = 0, linked_transaction_id = NULL
         WHERE id = ? OR id = ? OR linked_transaction_id = ?",
    )
    .bind(id.0)
    .bind(row.linked_transaction_id.map(|l| l.0))
    .bind(id.0)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// The detector never proposes an ignored pair again.
pub async fn ignore_transfer_pair(
    pool: &DbPool,
    outgoing_id: TransactionId,
    incoming_id: TransactionId,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    fetch_transaction(&mut tx, outgoing_id).await?;
    fetch_transaction(&mut tx, incoming_id).await?;
    sqlx::query("INSERT OR IGNORE INTO ignored_transfer_pairs (outgoing_id, incoming_id) VALUES (?, ?)")
        .bind(outgoing_id.0)
        .bind(incoming_id.0)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn get_ignored_transfer_pairs(
    pool: &DbPool,
) -> Result<Vec<(TransactionId, TransactionId)>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT outgoing_id, incoming_id FROM ignored_transfer_pairs",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(o, i)| (TransactionId(o), TransactionId(i)))
        .collect())
}

/// Linked pairs, counted once through their outgoing side.
pub async fn count_marked_transfers(pool: &DbPool) -> Result<i64, StorageError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions
         WHERE is_transfer = 1 AND linked_transaction_id IS NOT NULL AND amount_cents < 0",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

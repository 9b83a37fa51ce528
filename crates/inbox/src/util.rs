use crate::db::{Batch, Database};

/// Queues deletion of every key under `prefix` at or past `start`.
pub fn delete_starting_at<D: Database>(
    db: &D,
    batch: &mut dyn Batch,
    prefix: &[u8],
    start: &[u8],
) -> anyhow::Result<()> {
    let mut it = db.new_iterator(prefix, start);
    while it.next() {
        batch.delete(it.key())?;
    }
    if let Some(err) = it.error() {
        return Err(err);
    }
    it.release();
    Ok(())
}

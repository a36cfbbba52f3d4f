//! Merging of overlapping query hits.

use crate::models::{Chunk, DocumentId, rank_order};

/// Collapse overlapping same-section chunks of each document, then rank.
///
/// Documents keep the order in which they first appear; within a document,
/// chunks are swept by `begin` and each one that overlaps the running chunk
/// in the same section is folded into it with [`Chunk::merge`]. The combined
/// output is sorted by score descending, ties broken by document id then
/// begin, `NaN` scores last.
pub fn merge_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut groups: Vec<(DocumentId, Vec<Chunk>)> = Vec::new();
    for chunk in chunks {
        match groups.iter_mut().find(|(id, _)| *id == chunk.document_id) {
            Some((_, group)) => group.push(chunk),
            None => groups.push((chunk.document_id, vec![chunk])),
        }
    }

    let mut merged = Vec::new();
    for (_, mut group) in groups {
        group.sort_by_key(|c| (c.begin, c.end));

        let mut iter = group.into_iter();
        let Some(mut current) = iter.next() else {
            continue;
        };
        for next in iter {
            let folded = if current.overlaps(&next) {
                current.merge(&next)
            } else {
                None
            };
            match folded {
                Some(chunk) => current = chunk,
                None => merged.push(std::mem::replace(&mut current, next)),
            }
        }
        merged.push(current);
    }

    merged.sort_by(rank_order);
    merged
}

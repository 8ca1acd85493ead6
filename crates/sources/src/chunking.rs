//! Coalescing of small network reads into relay-sized chunks.

use bytes::BytesMut;
use futures_util::StreamExt;
use mediarelay_transfer::{ChunkStream, SourceError};

struct Coalesce {
    inner: ChunkStream,
    buf: BytesMut,
    target: usize,
    pending_err: Option<SourceError>,
    done: bool,
}

/// Merges consecutive chunks until each output chunk holds at least `target`
/// bytes. The final chunk may be shorter. Bytes buffered before an error are
/// emitted ahead of it.
pub fn coalesce(inner: ChunkStream, target: usize) -> ChunkStream {
    let state = Coalesce {
        inner,
        buf: BytesMut::new(),
        target: target.max(1),
        pending_err: None,
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        if let Some(err) = st.pending_err.take() {
            st.done = true;
            return Some((Err(err), st));
        }
        if st.done {
            return None;
        }

        while st.buf.len() < st.target {
            match st.inner.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => break,
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    if st.buf.is_empty() {
                        st.done = true;
                        return Some((Err(err), st));
                    }
                    st.pending_err = Some(err);
                    break;
                }
                None => break,
            }
        }

        if st.buf.len() < st.target && st.pending_err.is_none() {
            // Source exhausted.
            st.done = true;
        }
        if st.buf.is_empty() {
            return None;
        }
        let out = st.buf.split().freeze();
        Some((Ok(out), st))
    }))
}

//! Pending request table.
//!
//! Maps JSON-RPC ids to the one-shot channel of the caller waiting on that
//! id. Ids are allocated here, start at 1 and never repeat within a
//! session.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::MwaError;
use crate::jsonrpc::JsonRpcResponse;

/// What a caller eventually receives for one request.
pub type RpcOutcome = Result<serde_json::Value, MwaError>;

#[derive(Debug)]
pub struct PendingRequests {
    next_id: u64,
    entries: HashMap<u64, oneshot::Sender<RpcOutcome>>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Allocate the next id and park `reply` under it.
    pub fn register(&mut self, reply: oneshot::Sender<RpcOutcome>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, reply);
        id
    }

    /// Route a response to its caller. Returns `false` if no request with
    /// that id is outstanding.
    ///
    /// An `error` response rejects only this entry.
    pub fn resolve(&mut self, response: JsonRpcResponse) -> bool {
        match self.entries.remove(&response.id) {
            Some(reply) => {
                // The caller may have stopped waiting; that is not our problem.
                let _ = reply.send(response.into_result().map_err(MwaError::from));
                true
            }
            None => false,
        }
    }

    /// Fail a single entry, e.g. when its frame could not be sent.
    pub fn reject(&mut self, id: u64, error: MwaError) -> bool {
        match self.entries.remove(&id) {
            Some(reply) => {
                let _ = reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding entry with a clone of `error`. Returns how many
    /// were rejected; a second call returns 0.
    pub fn reject_all(&mut self, error: &MwaError) -> usize {
        let count = self.entries.len();
        for (_, reply) in self.entries.drain() {
            let _ = reply.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcErrorObject;
    use serde_json::json;

    fn parked(table: &mut PendingRequests) -> (u64, oneshot::Receiver<RpcOutcome>) {
        let (tx, rx) = oneshot::channel();
        (table.register(tx), rx)
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut table = PendingRequests::new();
        let ids: Vec<u64> = (0..3).map(|_| parked(&mut table).0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn responses_routed_by_id_in_any_order() {
        let mut table = PendingRequests::new();
        let (id1, rx1) = parked(&mut table);
        let (id2, rx2) = parked(&mut table);
        let (id3, rx3) = parked(&mut table);

        for id in [id3, id1, id2] {
            assert!(table.resolve(JsonRpcResponse::success(id, json!({ "id": id }))));
        }

        assert_eq!(rx1.await.unwrap().unwrap(), json!({ "id": 1 }));
        assert_eq!(rx2.await.unwrap().unwrap(), json!({ "id": 2 }));
        assert_eq!(rx3.await.unwrap().unwrap(), json!({ "id": 3 }));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn error_response_rejects_only_its_entry() {
        let mut table = PendingRequests::new();
        let (_, rx1) = parked(&mut table);
        let (id2, rx2) = parked(&mut table);

        table.resolve(JsonRpcResponse::failure(
            id2,
            JsonRpcErrorObject::new(-3, "declined"),
        ));
        match rx2.await.unwrap() {
            Err(MwaError::JsonRpc(e)) => assert_eq!((e.id, e.code), (2, -3)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(table.len(), 1);

        table.resolve(JsonRpcResponse::success(1, json!(true)));
        assert_eq!(rx1.await.unwrap().unwrap(), json!(true));
    }

    #[test]
    fn unknown_id_is_reported() {
        let mut table = PendingRequests::new();
        assert!(!table.resolve(JsonRpcResponse::success(42, json!(null))));
        assert!(!table.reject(42, MwaError::Disconnected));
    }

    #[tokio::test]
    async fn reject_all_is_idempotent() {
        let mut table = PendingRequests::new();
        let (_, rx1) = parked(&mut table);
        let (_, rx2) = parked(&mut table);

        assert_eq!(table.reject_all(&MwaError::Disconnected), 2);
        assert_eq!(table.reject_all(&MwaError::Disconnected), 0);

        assert!(matches!(rx1.await.unwrap(), Err(MwaError::Disconnected)));
        assert!(matches!(rx2.await.unwrap(), Err(MwaError::Disconnected)));
    }

    #[test]
    fn abandoned_receiver_does_not_panic() {
        let mut table = PendingRequests::new();
        let (id, rx) = parked(&mut table);
        drop(rx);
        assert!(table.resolve(JsonRpcResponse::success(id, json!(1))));
    }
}

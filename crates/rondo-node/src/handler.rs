//! Dispatch of inbound RPC requests onto the node.

use rondo_net::{Request, Response, RpcHandler, ACKNOWLEDGED};

use crate::error::NodeError;
use crate::node::Node;

/// Fold a node result into a wire response.
fn reply(result: Result<Response, NodeError>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => {
            let (kind, message) = e.as_fault();
            Response::Fault { kind, message }
        }
    }
}

#[async_trait::async_trait]
impl RpcHandler for Node {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Successor { id } => reply(
                self.find_successor(id)
                    .await
                    .map(|addr| Response::Successor { addr }),
            ),
            Request::GetId => Response::Id { id: self.id },
            Request::GetPredecessor => {
                let predecessor = { self.state.read().await.predecessor.clone() };
                reply(match predecessor {
                    Some(pred) => Ok(Response::Predecessor { addr: pred.addr }),
                    None => Err(NodeError::NilPredecessor),
                })
            }
            Request::Notify { addr } => reply(self.notify(addr).await.map(|()| Response::Ack)),
            Request::Check => Response::Checked {
                reply: ACKNOWLEDGED.to_string(),
            },
            Request::SetData { data } => {
                self.set_data(data).await;
                Response::Ack
            }
            Request::GetValue { key } => reply(
                self.get_value(&key)
                    .await
                    .map(|value| Response::Value { value }),
            ),
            Request::TransferData { to } => reply(
                self.transfer_data(&to, None)
                    .await
                    .map(|()| Response::Ack),
            ),
            Request::SetSuccessor { addr } => {
                reply(self.set_successor(addr).await.map(|()| Response::Ack))
            }
            Request::SetPredecessor { addr } => {
                reply(self.set_predecessor(addr).await.map(|()| Response::Ack))
            }
            Request::Save { kv } => {
                reply(self.save(kv).await.map(|addr| Response::Saved { addr }))
            }
            Request::Retrieve { key } => reply(
                self.retrieve(&key)
                    .await
                    .map(|value| Response::Retrieved { value }),
            ),
        }
    }
}

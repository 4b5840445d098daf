//! テスト用のスクリプト駆動ワーカー
//!
//! `post` の中で同期的に次の応答を制御領域へ書く。
//! 同じチャンネルに対する次のコマンドが届いたとき、前回のコマンドが
//! 未応答（`Silent`）のまま、または前回のシグナルが slot0 に残ったまま
//! であれば、同時に 2 つのコマンドを出したとして記録する。

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use syncfetch_channel::{ChannelWriter, ControlChannel, ControlRegion, HeapRegion};
use syncfetch_proto::{
    ChannelId, ConnectionId, FetchError, HeaderSlot, Headers, ResponseHead, WorkerCommand,
};

use crate::worker::FetchWorker;

/// ワーカーの応答 1 つ分
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Head(ResponseHead),
    Chunk(Vec<u8>),
    Eof,
    Timeout,
    Exception(String),
    /// 何も書かない（コンシューマ側の待機を期限切れにする）
    Silent,
}

pub(crate) struct ScriptedWorker {
    capacity: usize,
    next_channel: Cell<u64>,
    regions: RefCell<HashMap<ChannelId, Arc<HeapRegion>>>,
    connections: RefCell<HashMap<ConnectionId, ChannelId>>,
    script: RefCell<VecDeque<Step>>,
    commands: RefCell<Vec<WorkerCommand>>,
    /// チャンネルごとの直前のコマンドに応答を書いたか
    answered: RefCell<HashMap<ChannelId, bool>>,
    unconsumed: Cell<usize>,
}

impl ScriptedWorker {
    pub(crate) fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub(crate) fn with_script(steps: Vec<Step>) -> Self {
        ScriptedWorker {
            capacity: 256,
            next_channel: Cell::new(1),
            regions: RefCell::new(HashMap::new()),
            connections: RefCell::new(HashMap::new()),
            script: RefCell::new(steps.into()),
            commands: RefCell::new(Vec::new()),
            answered: RefCell::new(HashMap::new()),
            unconsumed: Cell::new(0),
        }
    }

    /// 以後に割り当てるチャンネルのペイロード容量
    pub(crate) fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub(crate) fn commands(&self) -> Vec<WorkerCommand> {
        self.commands.borrow().clone()
    }

    pub(crate) fn close_count(&self, id: &ConnectionId) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|c| matches!(c, WorkerCommand::Close(cid) if cid == id))
            .count()
    }

    pub(crate) fn get_more_count(&self) -> usize {
        self.commands
            .borrow()
            .iter()
            .filter(|c| matches!(c, WorkerCommand::GetMore(_)))
            .count()
    }

    /// 前回のコマンドが応答・消費される前に送られたコマンド数
    pub(crate) fn unconsumed_commands(&self) -> usize {
        self.unconsumed.get()
    }

    fn respond(&self, channel: ChannelId, region: &HeapRegion) -> Result<(), FetchError> {
        let step = self.script.borrow_mut().pop_front().unwrap_or(Step::Silent);
        self.answered
            .borrow_mut()
            .insert(channel, !matches!(step, Step::Silent));
        let writer = ChannelWriter::new(region);
        match step {
            Step::Head(head) => {
                self.connections
                    .borrow_mut()
                    .insert(head.connection_id.clone(), channel);
                writer.publish_head(&head)?
            }
            Step::Chunk(data) => {
                // 領域に収まらない分は次の GetMore で送る
                let written = writer.publish_chunk(&data)?;
                if written < data.len() {
                    self.script
                        .borrow_mut()
                        .push_front(Step::Chunk(data[written..].to_vec()));
                }
            }
            Step::Eof => writer.publish_eof(),
            Step::Timeout => writer.publish_timeout(),
            Step::Exception(message) => writer.publish_exception(&message),
            Step::Silent => {}
        }
        Ok(())
    }
}

impl FetchWorker for ScriptedWorker {
    fn allocate_channel(&self) -> Result<ControlChannel, FetchError> {
        let id = ChannelId(self.next_channel.get());
        self.next_channel.set(id.0 + 1);
        let region = Arc::new(HeapRegion::with_capacity(self.capacity));
        self.regions.borrow_mut().insert(id, Arc::clone(&region));
        Ok(ControlChannel::new(id, region))
    }

    fn post(&self, command: WorkerCommand) -> Result<(), FetchError> {
        let channel = match &command {
            WorkerCommand::Start(start) => Some(start.channel),
            WorkerCommand::GetMore(id) => self.connections.borrow().get(id).copied(),
            WorkerCommand::Close(_) => None,
        };
        let expects_signal = command.expects_signal();
        self.commands.borrow_mut().push(command);
        if !expects_signal {
            return Ok(());
        }

        let channel = channel
            .ok_or_else(|| FetchError::WorkerUnavailable("unknown connection".into()))?;
        let region = self.regions.borrow().get(&channel).cloned().ok_or_else(|| {
            FetchError::WorkerUnavailable(format!("unknown channel {channel}"))
        })?;
        let previous_unanswered = self.answered.borrow().get(&channel) == Some(&false);
        if previous_unanswered || region.load(HeaderSlot::Signal) != 0 {
            self.unconsumed.set(self.unconsumed.get() + 1);
        }
        self.respond(channel, &region)
    }
}

pub(crate) fn head(status: u16, headers: &[(&str, &str)], id: &str) -> ResponseHead {
    ResponseHead {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Headers>(),
        connection_id: id.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncfetch_proto::{Credentials, StartFetch};

    fn start(channel: ChannelId) -> WorkerCommand {
        WorkerCommand::Start(StartFetch {
            channel,
            url: "https://example.test/".into(),
            method: "GET".into(),
            headers: Headers::new(),
            body: None,
            credentials: Credentials::Omit,
        })
    }

    #[test]
    fn test_command_after_unanswered_command_is_counted() {
        let worker = ScriptedWorker::with_script(vec![Step::Head(head(200, &[], "c1")), Step::Silent]);
        let channel = worker.allocate_channel().unwrap();
        worker.post(start(channel.id())).unwrap();
        channel.reset();

        worker.post(WorkerCommand::GetMore("c1".into())).unwrap();
        assert_eq!(worker.unconsumed_commands(), 0);

        // slot0 はリセット済みでも、前回の GetMore はまだ応答されていない
        worker.post(WorkerCommand::GetMore("c1".into())).unwrap();
        assert_eq!(worker.unconsumed_commands(), 1);
    }

    #[test]
    fn test_command_without_reset_is_counted() {
        let worker = ScriptedWorker::with_script(vec![
            Step::Head(head(200, &[], "c1")),
            Step::Chunk(b"x".to_vec()),
        ]);
        let channel = worker.allocate_channel().unwrap();
        worker.post(start(channel.id())).unwrap();
        worker.post(WorkerCommand::GetMore("c1".into())).unwrap();
        assert_eq!(worker.unconsumed_commands(), 1);
    }
}

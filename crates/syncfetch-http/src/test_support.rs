//! テスト用ワーカーとトランスポート

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use syncfetch_channel::{ChannelWriter, ControlChannel, HeapRegion};
use syncfetch_proto::{ChannelId, FetchError, Headers, ResponseHead, WorkerCommand};
use syncfetch_stream::{FetchWorker, Response, StreamingFetcher};

use crate::transport::{BufferedTransport, PreparedRequest};

pub(crate) enum Reply {
    Head(ResponseHead),
    Chunk(Vec<u8>),
    Eof,
}

/// 単一接続分の応答を順に返すワーカー
pub(crate) struct ReplayWorker {
    region: RefCell<Option<Arc<HeapRegion>>>,
    replies: RefCell<VecDeque<Reply>>,
    starts: RefCell<Vec<WorkerCommand>>,
    closes: Cell<usize>,
}

impl ReplayWorker {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        ReplayWorker {
            region: RefCell::new(None),
            replies: RefCell::new(replies.into()),
            starts: RefCell::new(Vec::new()),
            closes: Cell::new(0),
        }
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.get()
    }

    pub(crate) fn start_commands(&self) -> Vec<WorkerCommand> {
        self.starts.borrow().clone()
    }
}

impl FetchWorker for ReplayWorker {
    fn allocate_channel(&self) -> Result<ControlChannel, FetchError> {
        let region = Arc::new(HeapRegion::with_capacity(256));
        *self.region.borrow_mut() = Some(Arc::clone(&region));
        Ok(ControlChannel::new(ChannelId(1), region))
    }

    fn post(&self, command: WorkerCommand) -> Result<(), FetchError> {
        match &command {
            WorkerCommand::Close(_) => {
                self.closes.set(self.closes.get() + 1);
                return Ok(());
            }
            WorkerCommand::Start(_) => self.starts.borrow_mut().push(command.clone()),
            WorkerCommand::GetMore(_) => {}
        }
        let region = self
            .region
            .borrow()
            .clone()
            .ok_or_else(|| FetchError::WorkerUnavailable("no channel".into()))?;
        let writer = ChannelWriter::new(region.as_ref());
        match self.replies.borrow_mut().pop_front() {
            Some(Reply::Head(head)) => writer.publish_head(&head)?,
            Some(Reply::Chunk(data)) => {
                writer.publish_chunk(&data)?;
            }
            Some(Reply::Eof) => writer.publish_eof(),
            None => {}
        }
        Ok(())
    }
}

pub(crate) fn head(status: u16, headers: &[(&str, &str)]) -> ResponseHead {
    ResponseHead {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        connection_id: "conn-1".into(),
    }
}

/// ヘッダー受信済みのストリーミングレスポンスを作る
pub(crate) fn streaming_response(
    status: u16,
    headers: &[(&str, &str)],
    body: Vec<Reply>,
) -> (Rc<ReplayWorker>, Response) {
    let mut replies = vec![Reply::Head(head(status, headers))];
    replies.extend(body);
    let worker = Rc::new(ReplayWorker::new(replies));
    let response = StreamingFetcher::new(worker.clone())
        .send(syncfetch_proto::Request::get("https://example.test/"))
        .unwrap();
    (worker, response)
}

/// 固定レスポンスを返し、受け取ったリクエストを記録するトランスポート
pub(crate) struct CannedTransport {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
    seen: RefCell<Vec<PreparedRequest>>,
}

impl CannedTransport {
    pub(crate) fn new(status: u16, body: &[u8]) -> Self {
        CannedTransport {
            status,
            headers: Headers::new(),
            body: body.to_vec(),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn seen(&self) -> Vec<PreparedRequest> {
        self.seen.borrow().clone()
    }
}

impl BufferedTransport for CannedTransport {
    fn fetch(&self, request: &PreparedRequest) -> Result<Response, FetchError> {
        self.seen.borrow_mut().push(request.clone());
        Ok(Response::buffered(
            self.status,
            self.headers.clone(),
            self.body.clone(),
        ))
    }
}

//! Request handlers on top of channel callbacks.
//!
//! A [`Handler`] turns a complete request into a complete response. The
//! [`HandlerFactory`] wires it into every channel of a connection: the handler
//! runs once the request body has ended, its response is written and the
//! channel released, so pipelined requests are answered one after the other.

use std::error::Error;
use std::sync::Arc;

use bytes::Bytes;
use http::{Response, StatusCode};
use tracing::{error, warn};

use crate::channel::{ChannelFactory, HttpChannel};
use crate::protocol::{HttpError, RequestHead};

pub trait Handler: Send + Sync {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn call(&self, request: &RequestHead, body: Bytes) -> Result<Response<Bytes>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Err> Handler for HandlerFn<F>
where
    F: Fn(&RequestHead, Bytes) -> Result<Response<Bytes>, Err> + Send + Sync,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    fn call(&self, request: &RequestHead, body: Bytes) -> Result<Response<Bytes>, Self::Error> {
        (self.f)(request, body)
    }
}

pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(&RequestHead, Bytes) -> Result<Response<Bytes>, Err>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}

/// Sets up each channel to answer its request with the handler.
#[derive(Debug)]
pub struct HandlerFactory<H> {
    handler: Arc<H>,
}

impl<H> HandlerFactory<H> {
    pub fn new(handler: H) -> Self {
        Self { handler: Arc::new(handler) }
    }

    pub fn from_shared(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H: Handler + 'static> ChannelFactory for HandlerFactory<H> {
    fn init_channel(&mut self, channel: &mut HttpChannel) {
        let handler = Arc::clone(&self.handler);
        channel.set_data_received_callback(move |channel| {
            if !channel.recv_body().is_closed() {
                return Ok(());
            }
            // the body may still get events, e.g. when the input closes later
            channel.set_data_received_callback(|_| Ok(()));
            respond(handler.as_ref(), channel)
        });
    }
}

fn respond<H: Handler>(handler: &H, channel: &mut HttpChannel) -> Result<(), HttpError> {
    let response = match channel.recv_body().error() {
        Some(e) => {
            warn!(channel = %channel.id(), cause = %e, "request body broken, answer 400");
            status_response(StatusCode::BAD_REQUEST)
        }
        None => {
            let body = channel.recv_body_mut().read_all();
            let request = channel.request().ok_or_else(|| HttpError::misuse("request body ended before the head"))?;
            match handler.call(request, body) {
                Ok(response) => response,
                Err(e) => {
                    let e: Box<dyn Error + Send + Sync> = e.into();
                    error!(channel = %channel.id(), cause = %e, "handler failed, answer 500");
                    status_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
    };

    let (parts, body) = response.into_parts();
    let head = channel.response_mut()?;
    head.set_status(parts.status);
    for (name, value) in &parts.headers {
        head.headers_mut().append(name, value.clone());
    }

    let send_body = channel.send_body_mut()?;
    send_body.append(body)?;
    send_body.close();
    channel.release()
}

fn status_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Connection;
    use http::header::{CONTENT_TYPE, HeaderValue};
    use std::io;

    fn echo(request: &RequestHead, body: Bytes) -> Result<Response<Bytes>, io::Error> {
        let mut response = Response::new(Bytes::from(format!("{} {}", request.method(), body.len())));
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Ok(response)
    }

    fn parse_responses(mut output: &[u8]) -> Vec<(u16, Vec<u8>)> {
        let mut responses = Vec::new();
        while !output.is_empty() {
            let mut headers = [httparse::EMPTY_HEADER; 8];
            let mut response = httparse::Response::new(&mut headers);
            let httparse::Status::Complete(head_len) = response.parse(output).unwrap() else {
                panic!("partial response head");
            };

            let length = response
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("content-length"))
                .map_or(0, |h| std::str::from_utf8(h.value).unwrap().parse::<usize>().unwrap());
            responses.push((response.code.unwrap(), output[head_len..head_len + length].to_vec()));
            output = &output[head_len + length..];
        }
        responses
    }

    #[test]
    fn answers_pipelined_requests_in_order() {
        let mut connection = Connection::with_handler(make_handler(echo));
        connection
            .feed(b"POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET /b HTTP/1.1\r\n\r\nPUT /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n")
            .unwrap();

        let output = connection.take_output();
        let responses = parse_responses(&output);
        assert_eq!(
            responses,
            vec![(200, b"POST 5".to_vec()), (200, b"GET 0".to_vec()), (200, b"PUT 3".to_vec())]
        );
        assert!(connection.is_persistent());
        assert_eq!(connection.current(), None);
    }

    #[test]
    fn answers_byte_by_byte_input() {
        let input = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nokGET /b HTTP/1.1\r\nConnection: close\r\n\r\n";
        let mut connection = Connection::with_handler(make_handler(echo));
        for byte in input {
            connection.feed(std::slice::from_ref(byte)).unwrap();
        }

        let output = connection.take_output();
        assert_eq!(parse_responses(&output), vec![(200, b"POST 2".to_vec()), (200, b"GET 0".to_vec())]);
        assert!(std::str::from_utf8(&output).unwrap().contains("connection: close\r\n"));
        assert!(connection.stream().is_output_closed());
    }

    #[test]
    fn handler_error_answers_500() {
        let handler = make_handler(|_: &RequestHead, _: Bytes| Err::<Response<Bytes>, _>(io::Error::other("boom")));
        let mut connection = Connection::with_handler(handler);
        connection.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        let output = connection.take_output();
        assert_eq!(parse_responses(&output), vec![(500, Vec::new())]);
        assert!(connection.is_persistent());
    }

    #[test]
    fn truncated_body_answers_400() {
        let mut connection = Connection::with_handler(make_handler(echo));
        connection.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").unwrap();
        assert!(connection.stream().pending_output().is_empty());

        connection.close_input().unwrap();
        let output = connection.take_output();
        assert_eq!(parse_responses(&output), vec![(400, Vec::new())]);
        assert!(connection.stream().is_output_closed());
    }

    #[test]
    fn shared_handler() {
        let handler = Arc::new(make_handler(echo));
        let mut first = Connection::new(HandlerFactory::from_shared(Arc::clone(&handler)));
        let mut second = Connection::new(HandlerFactory::from_shared(handler));

        first.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        second.feed(b"DELETE / HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(parse_responses(&first.take_output()), vec![(200, b"GET 0".to_vec())]);
        assert_eq!(parse_responses(&second.take_output()), vec![(200, b"DELETE 0".to_vec())]);
    }
}

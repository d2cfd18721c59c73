use std::future::Future;
use std::io;
use std::pin::Pin;

use bootwire_core::{Application, BoxedConnection, ConnectionInfo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const MAX_HEAD: usize = 8 * 1024;
pub const GREETING: &str = "Hello, World!";

/// Answers every request under the root path with a greeting.
///
/// One request per connection; no routing beyond the root-path prefix check.
pub struct HelloWorld;

impl Application for HelloWorld {
    fn name(&self) -> &str {
        "hello-world"
    }

    fn handle<'a>(
        &'a self,
        mut connection: BoxedConnection,
        info: ConnectionInfo,
    ) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let head = read_head(&mut connection).await?;
            let path = request_path(&head).unwrap_or("/");
            let response = respond(path, info.configuration.root_path());
            connection.write_all(response.as_bytes()).await?;
            connection.shutdown().await
        })
    }
}

async fn read_head(connection: &mut BoxedConnection) -> io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_HEAD {
        let n = connection.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Target of the request line, without query string.
fn request_path(head: &str) -> Option<&str> {
    let target = head.lines().next()?.split_whitespace().nth(1)?;
    Some(target.split('?').next().unwrap_or(target))
}

fn under_root(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    root.is_empty()
        || path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn respond(path: &str, root: &str) -> String {
    let (status, body) = if under_root(path, root) {
        ("200 OK", GREETING)
    } else {
        ("404 Not Found", "Not Found")
    };
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_request_path() {
        let head = "GET /helloworld/hello?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(request_path(head), Some("/helloworld/hello"));
        assert_eq!(request_path(""), None);
    }

    #[test]
    fn root_prefix_matching() {
        assert!(under_root("/anything", "/"));
        assert!(under_root("/helloworld", "/helloworld"));
        assert!(under_root("/helloworld/hello", "/helloworld/"));
        assert!(!under_root("/helloworlds", "/helloworld"));
        assert!(!under_root("/other", "/helloworld"));
    }

    #[test]
    fn responses_carry_length() {
        let ok = respond("/", "/");
        assert!(ok.starts_with("HTTP/1.1 200 OK"));
        assert!(ok.contains("Content-Length: 13"));
        assert!(ok.ends_with(GREETING));

        let missing = respond("/nope", "/api");
        assert!(missing.starts_with("HTTP/1.1 404 Not Found"));
    }

    #[tokio::test]
    async fn serves_over_a_duplex_stream() {
        use bootwire_core::Configuration;

        let (client, server) = tokio::io::duplex(4096);
        let info = ConnectionInfo {
            peer: None,
            instance_id: uuid::Uuid::nil(),
            configuration: Configuration::default(),
        };
        let serving = tokio::spawn(async move { HelloWorld.handle(Box::new(server), info).await });

        let mut client = client;
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();

        assert!(response.ends_with(GREETING));
        serving.await.unwrap().unwrap();
    }
}

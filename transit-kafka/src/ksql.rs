//! # 流式 SQL 引擎边界
//!
//! 守护主题已存在时视为语句已执行过，不再提交。

use reqwest::{Client, header::CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument};
use transit::{TransitError, domain::Admin};

const KSQL_CONTENT_TYPE: &str = "application/vnd.ksql.v1+json";

const TURNSTILE_STATEMENT: &str = "\
CREATE TABLE turnstile (
    station_id INT,
    line STRING,
    station_name STRING
) WITH (
    KAFKA_TOPIC='org.chicago.transit.turnstile',
    VALUE_FORMAT='avro',
    KEY='station_id'
);

CREATE TABLE turnstile_summary
WITH (VALUE_FORMAT='json') AS
    SELECT station_id, COUNT(station_id) AS count
    FROM turnstile
    GROUP BY station_id;
";

#[derive(Serialize)]
struct StreamsProperties {
    #[serde(rename = "ksql.streams.auto.offset.reset")]
    auto_offset_reset: &'static str,
}

#[derive(Serialize)]
struct KsqlRequest<'a> {
    ksql: &'a str,
    #[serde(rename = "streamsProperties")]
    streams_properties: StreamsProperties,
}

/// 待提交语句
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 语句执行后必然存在的主题
    pub guard_topic: String,
    /// 语句文本
    pub ksql: String,
}

impl Statement {
    /// 构造函数
    pub fn new(guard_topic: impl Into<String>, ksql: impl Into<String>) -> Self {
        Self {
            guard_topic: guard_topic.into(),
            ksql: ksql.into(),
        }
    }

    /// 闸机表及其按车站汇总表
    pub fn turnstile_summary() -> Self {
        Self::new("TURNSTILE_SUMMARY", TURNSTILE_STATEMENT)
    }

    fn body(&self) -> Result<Vec<u8>, TransitError> {
        Ok(serde_json::to_vec(&KsqlRequest {
            ksql: &self.ksql,
            streams_properties: StreamsProperties {
                auto_offset_reset: "earliest",
            },
        })?)
    }
}

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// 守护主题已存在，未提交
    Skipped,
    /// 已提交且引擎返回 2xx
    Submitted,
}

/// 查询引擎客户端
#[derive(Debug, Clone)]
pub struct KsqlClient {
    client: Client,
    url: String,
}

impl KsqlClient {
    /// 构造函数
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransitError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransitError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    /// 守护主题不存在时提交语句
    #[instrument(name = "execute_ksql", skip_all, fields(guard = %statement.guard_topic))]
    pub async fn execute<A: Admin>(
        &self,
        admin: &A,
        statement: &Statement,
    ) -> Result<Submission, TransitError> {
        if admin.topic_exists(&statement.guard_topic).await? {
            debug!("守护主题已存在，跳过语句提交");
            return Ok(Submission::Skipped);
        }
        let response = self
            .client
            .post(format!("{}/ksql", self.url))
            .header(CONTENT_TYPE, KSQL_CONTENT_TYPE)
            .body(statement.body()?)
            .send()
            .await
            .map_err(|e| TransitError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransitError::Query {
                status: status.as_u16(),
                body,
            });
        }
        info!("完成语句提交");
        Ok(Submission::Submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };
    use transit::test_utils::MemoryAdmin;

    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8(buf).unwrap()
    }

    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            request
        });
        (url, handle)
    }

    #[test]
    fn request_body_sets_earliest_offset_reset() {
        let statement = Statement::new("TURNSTILE_SUMMARY", "SHOW TABLES;");

        let body: serde_json::Value = serde_json::from_slice(&statement.body().unwrap()).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "ksql": "SHOW TABLES;",
                "streamsProperties": {"ksql.streams.auto.offset.reset": "earliest"}
            })
        );
    }

    #[test]
    fn turnstile_statement_builds_summary_table() {
        let statement = Statement::turnstile_summary();

        assert_eq!(statement.guard_topic, "TURNSTILE_SUMMARY");
        assert!(statement.ksql.contains("CREATE TABLE turnstile ("));
        assert!(statement.ksql.contains("CREATE TABLE turnstile_summary"));
        assert!(statement.ksql.contains("GROUP BY station_id"));
    }

    #[tokio::test]
    async fn existing_guard_topic_skips_submission() {
        let admin = MemoryAdmin::with_topics(["TURNSTILE_SUMMARY"]);
        let client = KsqlClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();

        let submission = client
            .execute(&admin, &Statement::turnstile_summary())
            .await
            .unwrap();

        assert_eq!(submission, Submission::Skipped);
    }

    #[tokio::test]
    async fn missing_guard_topic_posts_statement() {
        let (url, server) = serve_once("200 OK", "[]").await;
        let client = KsqlClient::new(&url, Duration::from_secs(5)).unwrap();

        let submission = client
            .execute(&MemoryAdmin::new(), &Statement::turnstile_summary())
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(submission, Submission::Submitted);
        assert!(request.starts_with("POST /ksql HTTP/1.1"));
        assert!(
            request
                .to_ascii_lowercase()
                .contains("content-type: application/vnd.ksql.v1+json")
        );
        assert!(request.contains(r#""ksql.streams.auto.offset.reset":"earliest""#));
    }

    #[tokio::test]
    async fn non_success_status_is_query_error() {
        let (url, server) = serve_once("400 Bad Request", r#"{"message":"line 1:1"}"#).await;
        let client = KsqlClient::new(&url, Duration::from_secs(5)).unwrap();

        let result = client
            .execute(&MemoryAdmin::new(), &Statement::turnstile_summary())
            .await;
        server.await.unwrap();

        match result {
            Err(TransitError::Query { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, r#"{"message":"line 1:1"}"#);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

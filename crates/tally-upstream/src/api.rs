//! The upstream operations the collectors use.
//!
//! [`UpstreamClient`] implements it over HTTP. Collectors are generic over the
//! trait so they can run against an in-process fake in tests.

use std::future::Future;

use chrono::NaiveDate;
use tally_core::date::format_date;

use crate::{
  CallOptions, Result, UpstreamClient,
  types::{ActivityItem, UpstreamHomework, UpstreamProblem, UpstreamStudent, parse_list},
};

pub trait TutoringApi: Send + Sync {
  /// Perform (or reuse) the login exchange. Collectors call this first so a
  /// rejected login aborts before any item is attempted.
  fn authenticate(&self) -> impl Future<Output = Result<()>> + Send + '_;

  /// The upstream's full student directory.
  fn list_students(
    &self,
  ) -> impl Future<Output = Result<Vec<UpstreamStudent>>> + Send + '_;

  /// A student's activity items for one civil date.
  fn student_activities<'a>(
    &'a self,
    student_id: &'a str,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<ActivityItem>>> + Send + 'a;

  /// A class's homework for one civil date.
  fn class_homework<'a>(
    &'a self,
    class_id: &'a str,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<UpstreamHomework>>> + Send + 'a;

  /// Problem detail for one workbook step.
  fn workbook_problems<'a>(
    &'a self,
    student_id: &'a str,
    progress_id: &'a str,
  ) -> impl Future<Output = Result<Vec<UpstreamProblem>>> + Send + 'a;

  /// Full problem list of a worksheet.
  fn worksheet_problems<'a>(
    &'a self,
    student_id: &'a str,
    book_id: &'a str,
  ) -> impl Future<Output = Result<Vec<UpstreamProblem>>> + Send + 'a;
}

fn single_day(date: NaiveDate) -> CallOptions {
  let day = format_date(date);
  CallOptions::get().query("startDate", day.clone()).query("endDate", day)
}

impl TutoringApi for UpstreamClient {
  async fn authenticate(&self) -> Result<()> {
    self.session().ensure_token().await?;
    Ok(())
  }

  async fn list_students(&self) -> Result<Vec<UpstreamStudent>> {
    let value = self.call("/students", CallOptions::get()).await?;
    parse_list(value)
  }

  async fn student_activities(
    &self,
    student_id: &str,
    date: NaiveDate,
  ) -> Result<Vec<ActivityItem>> {
    let endpoint = format!("/students/{student_id}/activities");
    let value = self.call(&endpoint, single_day(date)).await?;
    parse_list(value)
  }

  async fn class_homework(
    &self,
    class_id: &str,
    date: NaiveDate,
  ) -> Result<Vec<UpstreamHomework>> {
    let endpoint = format!("/classes/{class_id}/homework");
    let value = self.call(&endpoint, single_day(date)).await?;
    parse_list(value)
  }

  async fn workbook_problems(
    &self,
    student_id: &str,
    progress_id: &str,
  ) -> Result<Vec<UpstreamProblem>> {
    let endpoint = format!("/students/{student_id}/progress/{progress_id}/problems");
    let value = self.call(&endpoint, CallOptions::get()).await?;
    parse_list(value)
  }

  async fn worksheet_problems(
    &self,
    student_id: &str,
    book_id: &str,
  ) -> Result<Vec<UpstreamProblem>> {
    let endpoint = format!("/students/{student_id}/worksheets/{book_id}/problems");
    let value = self.call(&endpoint, CallOptions::get()).await?;
    parse_list(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::UpstreamConfig;
  use serde_json::json;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
  };

  async fn client() -> (MockServer, UpstreamClient) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
      .mount(&server)
      .await;
    let client = UpstreamClient::new(UpstreamConfig {
      base_url:             server.uri(),
      login_id:             Some("teacher".into()),
      password:             Some("pw".into()),
      platform_id:          "web".into(),
      token_lifetime_secs:  3600,
      request_timeout_secs: 5,
    })
    .unwrap();
    (server, client)
  }

  #[tokio::test]
  async fn activities_are_scoped_to_one_civil_day() {
    let (server, client) = client().await;
    Mock::given(method("GET"))
      .and(path("/students/s-1/activities"))
      .and(query_param("startDate", "2024-03-04"))
      .and(query_param("endDate", "2024-03-04"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "data": [{ "title": "Unit 1", "components": [] }]
      })))
      .expect(1)
      .mount(&server)
      .await;

    let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let items = client.student_activities("s-1", date).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Unit 1");
  }

  #[tokio::test]
  async fn worksheet_problems_hit_the_book_endpoint() {
    let (server, client) = client().await;
    Mock::given(method("GET"))
      .and(path("/students/s-1/worksheets/b-9/problems"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        { "problemId": 1, "result": "O" },
        { "problemId": 2, "result": "X" }
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let problems = client.worksheet_problems("s-1", "b-9").await.unwrap();
    assert_eq!(problems.len(), 2);
  }

  #[tokio::test]
  async fn authenticate_surfaces_rejected_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/login"))
      .respond_with(ResponseTemplate::new(403))
      .mount(&server)
      .await;
    let client = UpstreamClient::new(UpstreamConfig {
      base_url:             server.uri(),
      login_id:             Some("teacher".into()),
      password:             Some("pw".into()),
      platform_id:          "web".into(),
      token_lifetime_secs:  3600,
      request_timeout_secs: 5,
    })
    .unwrap();

    let err = client.authenticate().await.unwrap_err();
    assert!(err.is_fatal());
  }
}

//! Integration tests for notionfm-notion
//!
//! Uses wiremock to simulate the Notion API and verifies retry, rate
//! limiting, file upload endpoints, and block listings end to end.


mod test_file_uploads;
mod test_provider;

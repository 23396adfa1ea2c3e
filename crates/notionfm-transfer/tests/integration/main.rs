//! Integration tests for notionfm-transfer
//!
//! Drives the upload engine against a scripted in-memory remote store that
//! records every call, and the downloader against a wiremock server.


mod test_download;
mod test_session;

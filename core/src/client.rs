//! Request builder and action dispatcher for the XML publishing interface.
//!
//! # Design
//! `FmClient` holds the connection settings, the database/layout pair and
//! the pending [`QueryParams`]. Each action is split the same way as a
//! host-does-IO client: [`build_request`](FmClient::build_request) produces an
//! `HttpRequest`, the [`Transport`] executes it, and
//! [`parse_response`](FmClient::parse_response) turns the `HttpResponse` into
//! a [`ResultSet`]. Pending parameters are cleared as soon as a request has
//! been built, so a failed action never leaks criteria into the next one.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};

use crate::config::{ClientConfig, Credentials, Scheme};
use crate::error::{FmError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::params::{encode_query, Action, Operator, QueryParams, ScriptTiming, SortOrder};
use crate::parser::ResponseParser;
use crate::result::ResultSet;
use crate::transport::{Transport, UreqTransport};

/// Longest query string sent as a GET; anything longer is POSTed.
pub const MAX_GET_QUERY_LEN: usize = 2048;

pub const USER_AGENT: &str = concat!("fmxml/", env!("CARGO_PKG_VERSION"));

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Client for one FileMaker Web Publishing Engine.
///
/// Not meant to be shared between threads without a lock; each logical
/// session should own its client.
///
/// ```no_run
/// use fmxml_core::{FmClient, Operator, Scheme, SortOrder};
///
/// # fn example() -> fmxml_core::Result<()> {
/// let mut fm = FmClient::new("filemaker.example.com", 80, Scheme::Http);
/// fm.set_db_data("database", "layout");
/// fm.set_credentials("fmuser", "password");
/// fm.add_find_criterion("LAST", "Doe", Some(Operator::Bw));
/// fm.add_sort("LAST", SortOrder::Ascend, 1);
/// let found = fm.find()?;
/// for record in &found {
///     println!("{:?}", record.text("FIRST")?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FmClient<T: Transport = UreqTransport> {
    config: ClientConfig,
    database: Option<(String, String)>,
    response_layout: Option<String>,
    params: QueryParams,
    escape_text: bool,
    transport: T,
}

impl FmClient<UreqTransport> {
    pub fn new(host: &str, port: u16, scheme: Scheme) -> Self {
        Self::from_config(ClientConfig::new(host, port, scheme))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }
}

impl<T: Transport> FmClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            database: None,
            response_layout: None,
            params: QueryParams::new(),
            escape_text: false,
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Parameters that the next action will send.
    pub fn pending(&self) -> &QueryParams {
        &self.params
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Select the database and layout every following action targets.
    pub fn set_db_data(&mut self, database: &str, layout: &str) -> &mut Self {
        self.database = Some((database.to_string(), layout.to_string()));
        self.response_layout = None;
        self
    }

    /// Return results through a different layout than the one searched.
    pub fn set_response_layout(&mut self, layout: &str) -> &mut Self {
        self.response_layout = Some(layout.to_string());
        self
    }

    pub fn set_credentials(&mut self, username: &str, password: &str) -> &mut Self {
        self.config.credentials = Some(Credentials::new(username, password));
        self
    }

    /// `None` returns every matching record.
    pub fn set_max_records(&mut self, max: Option<u32>) -> &mut Self {
        self.params.set_max_records(max);
        self
    }

    /// Index of the first record returned; applies to the next action only.
    pub fn set_skip_records(&mut self, skip: u32) -> &mut Self {
        self.params.set_skip_records(skip);
        self
    }

    /// Escape `TEXT` values in results for XHTML output.
    pub fn set_escape(&mut self, enabled: bool) -> &mut Self {
        self.escape_text = enabled;
        self
    }

    // -----------------------------------------------------------------------
    // Pending parameters
    // -----------------------------------------------------------------------

    pub fn add_find_criterion(&mut self, field: &str, value: &str, op: Option<Operator>) -> &mut Self {
        self.params.add_find_criterion(field, value, op);
        self
    }

    pub fn add_field_value(&mut self, field: &str, value: &str) -> &mut Self {
        self.params.add_field_value(field, value);
        self
    }

    pub fn add_field_values<'a, I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (field, value) in values {
            self.params.add_field_value(field, value);
        }
        self
    }

    pub fn add_sort(&mut self, field: &str, order: SortOrder, precedence: u32) -> &mut Self {
        self.params.add_sort(field, order, precedence);
        self
    }

    pub fn set_record_id(&mut self, record_id: u64) -> &mut Self {
        self.params.set_record_id(record_id);
        self
    }

    /// Reject the edit with code 306 if the record changed since `mod_id`.
    pub fn set_modifier_id(&mut self, mod_id: u64) -> &mut Self {
        self.params.set_modifier_id(mod_id);
        self
    }

    /// Match records satisfying any criterion instead of all of them.
    pub fn set_logical_or(&mut self) -> &mut Self {
        self.params.set_logical_or();
        self
    }

    pub fn set_script(&mut self, name: &str, timing: ScriptTiming) -> &mut Self {
        self.params.set_script(name, timing);
        self
    }

    pub fn clear_params(&mut self) -> &mut Self {
        self.params.clear();
        self
    }

    // -----------------------------------------------------------------------
    // Build / parse
    // -----------------------------------------------------------------------

    /// Assemble the request for `action` from the current state. Does not
    /// touch the pending parameters.
    pub fn build_request(&self, action: Action) -> Result<HttpRequest> {
        let (database, layout) = self.database.as_ref().ok_or(FmError::MissingDatabase)?;

        let mut pairs = vec![
            ("-db".to_string(), database.clone()),
            ("-lay".to_string(), layout.clone()),
        ];
        if let Some(response) = &self.response_layout {
            pairs.push(("-lay.response".to_string(), response.clone()));
        }
        pairs.extend(self.params.pairs());
        let query = encode_query(&pairs, action);

        let mut headers = vec![("User-Agent".to_string(), USER_AGENT.to_string())];
        if let Some(credentials) = &self.config.credentials {
            headers.push(("Authorization".to_string(), basic_auth(credentials)));
        }

        let endpoint = self.config.endpoint();
        if query.len() <= MAX_GET_QUERY_LEN {
            Ok(HttpRequest {
                method: HttpMethod::Get,
                url: format!("{endpoint}?{query}"),
                headers,
                body: None,
            })
        } else {
            headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
            Ok(HttpRequest {
                method: HttpMethod::Post,
                url: endpoint,
                headers,
                body: Some(query),
            })
        }
    }

    /// Check the transport status and decode the FMPXMLRESULT body. The
    /// reply headers are kept on the result set.
    pub fn parse_response(&self, response: HttpResponse) -> Result<ResultSet> {
        check_status(&response)?;
        ResponseParser::new()
            .escape_text(self.escape_text)
            .parse(&response.body)
            .map(|set| set.with_headers(response.headers))
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Build, send and parse one action. Pending parameters are cleared
    /// whether or not the action succeeds.
    pub fn execute(&mut self, action: Action) -> Result<ResultSet> {
        if action.needs_record_id() && !self.params.has_record_id() {
            warn!(%action, "no record id set; the server will reject the request");
        }
        let request = self.build_request(action);
        self.params.clear();
        let request = request?;

        debug!(
            %action,
            method = ?request.method,
            endpoint = %self.config.endpoint(),
            "dispatching FileMaker action"
        );
        let response = self.transport.execute(&request)?;
        let url = request_url(&request);
        self.parse_response(response).map(|set| set.with_url(url))
    }

    /// Create a record from the pending field values.
    pub fn new_record(&mut self) -> Result<ResultSet> {
        self.execute(Action::New)
    }

    pub fn find(&mut self) -> Result<ResultSet> {
        self.execute(Action::Find)
    }

    /// Return one random record.
    pub fn find_any(&mut self) -> Result<ResultSet> {
        self.execute(Action::FindAny)
    }

    pub fn find_all(&mut self) -> Result<ResultSet> {
        self.execute(Action::FindAll)
    }

    /// Update the record named by `set_record_id` with the pending values.
    pub fn edit(&mut self) -> Result<ResultSet> {
        self.execute(Action::Edit)
    }

    pub fn delete(&mut self) -> Result<ResultSet> {
        self.execute(Action::Delete)
    }

    pub fn duplicate(&mut self) -> Result<ResultSet> {
        self.execute(Action::Duplicate)
    }

    /// Layout metadata only; the result set carries no records.
    pub fn view(&mut self) -> Result<ResultSet> {
        self.execute(Action::View)
    }
}

fn basic_auth(credentials: &Credentials) -> String {
    let token = BASE64.encode(format!("{}:{}", credentials.username, credentials.password));
    format!("Basic {token}")
}

/// The URL reported on results. POSTed queries are shown as if sent by GET.
fn request_url(request: &HttpRequest) -> String {
    match (&request.method, &request.body) {
        (HttpMethod::Post, Some(body)) => format!("{}?{body}", request.url),
        _ => request.url.clone(),
    }
}

/// Map non-2xx statuses to `FmError::HttpStatus`.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(FmError::HttpStatus {
        status: response.status,
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::result::FieldValue;

    /// Replies with a fixed body and records what it was asked to send.
    struct Canned {
        status: u16,
        body: String,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl Canned {
        fn ok(body: &str) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.seen.borrow_mut().push(request.clone());
            Ok(HttpResponse {
                status: self.status,
                headers: vec![
                    ("Content-Type".to_string(), "text/xml;charset=UTF-8".to_string()),
                    ("Server".to_string(), "FileMaker".to_string()),
                ],
                body: self.body.clone(),
            })
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            Err(FmError::Connection("connection refused".to_string()))
        }
    }

    const DOE: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<FMPXMLRESULT xmlns="http://www.filemaker.com/fmpxmlresult">
<ERRORCODE>0</ERRORCODE>
<PRODUCT BUILD="06/14/2006" NAME="FileMaker Web Publishing Engine" VERSION="8.0.4.128"/>
<DATABASE DATEFORMAT="MM/dd/yyyy" LAYOUT="layout" NAME="database" RECORDS="3" TIMEFORMAT="HH:mm:ss"/>
<METADATA>
<FIELD EMPTYOK="YES" MAXREPEAT="1" NAME="FIRST" TYPE="TEXT"/>
<FIELD EMPTYOK="YES" MAXREPEAT="1" NAME="LAST" TYPE="TEXT"/>
<FIELD EMPTYOK="YES" MAXREPEAT="3" NAME="PHONE" TYPE="TEXT"/>
</METADATA>
<RESULTSET FOUND="2">
<ROW MODID="0" RECORDID="1"><COL><DATA>John</DATA></COL><COL><DATA>Doe</DATA></COL><COL><DATA>555-0100</DATA><DATA>555-0101</DATA><DATA/></COL></ROW>
<ROW MODID="2" RECORDID="3"><COL><DATA>Jane</DATA></COL><COL><DATA>Doex</DATA></COL><COL><DATA/><DATA/><DATA/></COL></ROW>
</RESULTSET>
</FMPXMLRESULT>"#;

    const NO_MATCH: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<FMPXMLRESULT xmlns="http://www.filemaker.com/fmpxmlresult"><ERRORCODE>401</ERRORCODE><PRODUCT BUILD="" NAME="" VERSION=""/><DATABASE DATEFORMAT="" LAYOUT="" NAME="" RECORDS="0" TIMEFORMAT=""/><METADATA></METADATA><RESULTSET FOUND="0"></RESULTSET></FMPXMLRESULT>"#;

    fn client(body: &str) -> FmClient<Canned> {
        let mut fm = FmClient::with_transport(
            ClientConfig::new("localhost", 8080, Scheme::Http),
            Canned::ok(body),
        );
        fm.set_db_data("database", "layout");
        fm
    }

    fn query_of(request: &HttpRequest) -> String {
        request.url.split_once('?').map(|(_, q)| q.to_string()).unwrap_or_default()
    }

    #[test]
    fn build_request_without_database_fails() {
        let fm = FmClient::with_transport(
            ClientConfig::new("localhost", 80, Scheme::Http),
            Unreachable,
        );
        assert!(matches!(
            fm.build_request(Action::FindAll),
            Err(FmError::MissingDatabase)
        ));
    }

    #[test]
    fn build_find_request() {
        let mut fm = client(DOE);
        fm.add_find_criterion("LAST", "Doe", Some(Operator::Bw))
            .add_sort("FIRST", SortOrder::Ascend, 2)
            .add_sort("LAST", SortOrder::Ascend, 1);
        let req = fm.build_request(Action::Find).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.url.starts_with("http://localhost:8080/fmi/xml/FMPXMLRESULT.xml?"));
        assert_eq!(
            query_of(&req),
            "-db=database&-lay=layout&LAST=Doe&LAST.op=bw\
             &-sortfield.1=LAST&-sortorder.1=ascend\
             &-sortfield.2=FIRST&-sortorder.2=ascend&-max=50&-find"
        );
        assert_eq!(req.header("User-Agent"), Some(USER_AGENT));
        assert!(req.header("Authorization").is_none());
    }

    #[test]
    fn reply_headers_reach_result_set() {
        let mut fm = client(DOE);
        let set = fm.find_all().unwrap();
        assert_eq!(set.header("content-type"), Some("text/xml;charset=UTF-8"));
        assert_eq!(set.headers().len(), 2);
    }

    #[test]
    fn response_layout_follows_layout() {
        let mut fm = client(DOE);
        fm.set_response_layout("detail");
        let req = fm.build_request(Action::View).unwrap();
        assert_eq!(
            query_of(&req),
            "-db=database&-lay=layout&-lay.response=detail&-max=50&-view"
        );
    }

    #[test]
    fn credentials_become_basic_auth_header() {
        let mut fm = client(DOE);
        fm.set_credentials("fmuser", "password");
        let req = fm.build_request(Action::FindAll).unwrap();
        assert_eq!(req.header("Authorization"), Some("Basic Zm11c2VyOnBhc3N3b3Jk"));
        assert!(!req.url.contains("password"));
    }

    #[test]
    fn long_queries_are_posted() {
        let mut fm = client(DOE);
        let long = "x".repeat(MAX_GET_QUERY_LEN);
        fm.add_field_value("NOTES", &long);
        let req = fm.build_request(Action::New).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:8080/fmi/xml/FMPXMLRESULT.xml");
        assert_eq!(req.header("content-type"), Some(FORM_CONTENT_TYPE));
        assert!(req.body.as_deref().unwrap().ends_with("&-new"));
    }

    #[test]
    fn find_returns_records_in_order() {
        let mut fm = client(DOE);
        fm.add_find_criterion("LAST", "Doe", Some(Operator::Bw))
            .add_sort("LAST", SortOrder::Ascend, 1)
            .add_sort("FIRST", SortOrder::Ascend, 2);
        let found = fm.find().unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text("FIRST").unwrap(), Some("John"));
        assert_eq!(found[0].text("LAST").unwrap(), Some("Doe"));
        assert_eq!(
            found[0].get("PHONE").unwrap(),
            &FieldValue::Repeated(vec!["555-0100".to_string(), "555-0101".to_string()])
        );
        assert_eq!(found[1].get("PHONE").unwrap(), &FieldValue::Repeated(Vec::new()));
        assert!(found.url().ends_with("&-find"));
    }

    #[test]
    fn pending_params_cleared_after_action() {
        let mut fm = client(DOE);
        fm.add_find_criterion("LAST", "Doe", None).set_skip_records(5);
        fm.find().unwrap();
        assert!(fm.pending().is_empty());
        assert_eq!(fm.pending().skip_records(), 0);

        fm.find_all().unwrap();
        let seen = fm.transport().seen.borrow();
        assert_eq!(query_of(&seen[1]), "-db=database&-lay=layout&-max=50&-findall");
    }

    #[test]
    fn no_match_raises_401() {
        let mut fm = client(NO_MATCH);
        fm.add_find_criterion("LAST", "Nobody", Some(Operator::Cn));
        let err = fm.find().unwrap_err();
        assert_eq!(err.server_code(), Some(401));
        assert_eq!(
            err.to_string(),
            "FileMaker Error 401: No records match the request"
        );
        assert!(fm.pending().is_empty());
    }

    #[test]
    fn connection_failure_clears_params() {
        let mut fm = FmClient::with_transport(
            ClientConfig::new("localhost", 1, Scheme::Http),
            Unreachable,
        );
        fm.set_db_data("database", "layout");
        fm.add_field_value("FIRST", "John");
        let err = fm.new_record().unwrap_err();
        assert!(err.is_transport());
        assert!(fm.pending().is_empty());
    }

    #[test]
    fn http_error_status() {
        let mut fm = client("<html>Unauthorized</html>");
        fm.transport.status = 401;
        let err = fm.find_all().unwrap_err();
        assert!(matches!(err, FmError::HttpStatus { status: 401, .. }));
    }

    #[test]
    fn max_records_persist_across_actions() {
        let mut fm = client(DOE);
        fm.set_max_records(None);
        fm.find_all().unwrap();
        fm.find_all().unwrap();
        let seen = fm.transport().seen.borrow();
        assert!(query_of(&seen[1]).contains("-max=all"));
    }

    #[test]
    fn escape_option_reaches_parser() {
        let body = DOE.replace("<DATA>John</DATA>", "<DATA>Jöhn</DATA>");
        let mut fm = client(&body);
        fm.set_escape(true);
        let found = fm.find_all().unwrap();
        assert_eq!(found[0].text("FIRST").unwrap(), Some("J&#246;hn"));
    }
}

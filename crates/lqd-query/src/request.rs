//! LQL request objects and the line-oriented parser.
//!
//! A request is a block of header lines terminated by a blank line. The
//! parser is single-pass and produces a fully validated [`Request`]:
//! filter and stats columns must resolve at parse time, projection columns
//! are forgiven once via the table prefix fallback.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use lqd_common::{LqdError, LqdResult};
use lqd_schema::{Catalog, Column, Table, TableName};

use crate::filter::{
    parse_filter, parse_group_op, parse_stats, parse_stats_op, Filter, GroupOperator,
};

static RE_GET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^GET ([a-z]+)$").expect("valid regex"));
static RE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^COMMAND \[\d+\] .+$").expect("valid regex"));

/// Sort direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// The wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One `Sort:` header entry.
#[derive(Debug, Clone)]
pub struct SortField {
    /// Column name as requested (lowercased, prefix-rewritten).
    pub name: String,
    /// Sort direction, ascending by default.
    pub direction: SortDirection,
    /// Variable name for custom-variable sorting.
    pub args: String,
    /// The bound column.
    pub column: Arc<Column>,
}

/// Response body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON array of row arrays.
    #[default]
    Json,
    /// Object with `data`, `total`, `failed` and optional `columns`.
    WrappedJson,
    /// Python literal rendering of the JSON shape.
    Python,
}

impl OutputFormat {
    /// The wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::WrappedJson => "wrapped_json",
            Self::Python => "python",
        }
    }
}

/// A parsed LQL request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Queried table; `None` for command requests.
    pub table: Option<TableName>,
    /// Raw `COMMAND` line for passthrough requests.
    pub command: String,
    /// Requested columns; empty means all columns (or, for stats queries,
    /// no grouping).
    pub columns: Vec<String>,
    /// Filter stack; the top-level entries combine as a conjunction.
    pub filter: Vec<Filter>,
    /// Stats stack, one slot per `Stats:` header.
    pub stats: Vec<Filter>,
    /// Maximum number of result rows.
    pub limit: Option<usize>,
    /// Rows to skip before the limit applies.
    pub offset: usize,
    /// Multi-key sort order.
    pub sort: Vec<SortField>,
    /// Prefix the response with the fixed16 status header.
    pub response_fixed16: bool,
    /// Explicitly requested output format.
    pub output_format: Option<OutputFormat>,
    /// Backend ids to query; empty means all.
    pub backends: Vec<String>,
    /// Emit a first row holding the column names.
    pub send_columns_header: bool,
    /// Keep the connection open after the response.
    pub keep_alive: bool,
    /// Contact name for authorization projection.
    pub auth_user: String,
    /// Wait trigger name; converts the request into a blocking poll.
    pub wait_trigger: String,
    /// Primary key of the row the wait condition is checked on.
    pub wait_object: String,
    /// Wait timeout in milliseconds.
    pub wait_timeout: u64,
    /// Wait condition filter stack.
    pub wait_condition: Vec<Filter>,
    /// Negates the whole wait condition.
    pub wait_condition_negate: bool,
    /// Internal: this request was dispatched by a partner node; never
    /// re-distribute it.
    pub distributed: bool,
    /// Internal: serialize stats slots as raw `[value, count]` pairs.
    pub send_stats_data: bool,
}

impl Request {
    /// Parses one request block. The text may contain trailing blank lines;
    /// everything after the terminating blank line is ignored.
    pub fn parse(text: &str, catalog: &Catalog) -> LqdResult<Request> {
        let mut lines = text.lines().map(str::trim);
        let first = lines.next().unwrap_or("").to_string();
        let mut req = Request::default();
        req.parse_first_line(&first, catalog)?;

        let table = req.table.map(|t| Arc::clone(catalog.table(t)));
        for line in lines {
            if line.is_empty() {
                break;
            }
            debug!("request: {}", line);
            req.parse_header_line(line, table.as_deref())?;
        }
        Ok(req)
    }

    /// Returns true if this is a command passthrough request.
    #[must_use]
    pub fn is_command(&self) -> bool {
        !self.command.is_empty()
    }

    /// Returns true if this request carries stats headers.
    #[must_use]
    pub fn is_stats(&self) -> bool {
        !self.stats.is_empty()
    }

    /// The effective output format.
    #[must_use]
    pub fn effective_output_format(&self) -> OutputFormat {
        self.output_format.unwrap_or_default()
    }

    fn parse_first_line(&mut self, line: &str, catalog: &Catalog) -> LqdResult<()> {
        if let Some(rest) = line.strip_prefix("GET ") {
            if !RE_GET.is_match(line) {
                return Err(LqdError::bad_request(line));
            }
            match catalog.table_by_name(rest) {
                Some(table) => {
                    self.table = Some(table.name);
                    Ok(())
                }
                None => Err(LqdError::TableNotFound {
                    table: rest.to_string(),
                }),
            }
        } else if line.starts_with("COMMAND ") {
            if !RE_COMMAND.is_match(line) {
                return Err(LqdError::bad_request(line));
            }
            self.command = line.to_string();
            Ok(())
        } else if line.is_empty() {
            Err(LqdError::bad_request("empty request"))
        } else {
            Err(LqdError::bad_request(line))
        }
    }

    fn parse_header_line(&mut self, line: &str, table: Option<&Table>) -> LqdResult<()> {
        let Some((name, value)) = line.split_once(':') else {
            return Err(LqdError::bad_request_in("syntax error", line));
        };
        let name = name.to_lowercase();
        let value = value.trim();

        // Commands only accept connection-level headers.
        let table = match table {
            Some(table) => table,
            None => {
                return match name.as_str() {
                    "backends" => {
                        self.backends = split_list(value);
                        Ok(())
                    }
                    "responseheader" => self.parse_response_header(value, line),
                    "keepalive" => {
                        self.keep_alive = parse_on_off(value, line)?;
                        Ok(())
                    }
                    "localtime" => Ok(()),
                    _ => Err(LqdError::bad_request_in(
                        "invalid header for command request",
                        line,
                    )),
                };
            }
        };

        match name.as_str() {
            "filter" => parse_filter(value, line, table, &mut self.filter),
            "and" => parse_group_op(GroupOperator::And, value, line, &mut self.filter),
            "or" => parse_group_op(GroupOperator::Or, value, line, &mut self.filter),
            "negate" => match self.filter.last_mut() {
                Some(top) => {
                    top.negate = !top.negate;
                    Ok(())
                }
                None => Err(LqdError::bad_request_in("no filter on stack to negate", line)),
            },
            "stats" => parse_stats(value, line, table, &mut self.stats),
            "statsand" => {
                parse_stats_op(GroupOperator::And, value, line, table, &mut self.stats)
            }
            "statsor" => parse_stats_op(GroupOperator::Or, value, line, table, &mut self.stats),
            "sort" => self.parse_sort_header(value, line, table),
            "limit" => {
                self.limit = Some(parse_non_negative(value, line)?);
                Ok(())
            }
            "offset" => {
                self.offset = parse_non_negative(value, line)?;
                Ok(())
            }
            "backends" => {
                self.backends = split_list(value);
                Ok(())
            }
            "columns" => {
                self.columns = split_list(value)
                    .into_iter()
                    .map(|name| match table.column_with_fallback(&name) {
                        Some((_, Some(rewritten))) => rewritten,
                        _ => name,
                    })
                    .collect();
                Ok(())
            }
            "responseheader" => self.parse_response_header(value, line),
            "outputformat" => {
                self.output_format = Some(match value {
                    "json" => OutputFormat::Json,
                    "wrapped_json" => OutputFormat::WrappedJson,
                    "python" => OutputFormat::Python,
                    _ => {
                        return Err(LqdError::bad_request_in(
                            "unrecognized outputformat, choose from json, wrapped_json and python",
                            line,
                        ));
                    }
                });
                Ok(())
            }
            "columnheaders" => {
                self.send_columns_header = parse_on_off(value, line)?;
                Ok(())
            }
            "keepalive" => {
                self.keep_alive = parse_on_off(value, line)?;
                Ok(())
            }
            "authuser" => {
                self.auth_user = value.to_string();
                Ok(())
            }
            "waittrigger" => {
                self.wait_trigger = value.to_string();
                Ok(())
            }
            "waitobject" => {
                self.wait_object = value.to_string();
                Ok(())
            }
            "waittimeout" => {
                let timeout = parse_non_negative(value, line)?;
                if timeout < 1 {
                    return Err(LqdError::bad_request_in(
                        "expecting a positive number",
                        line,
                    ));
                }
                self.wait_timeout = timeout as u64;
                Ok(())
            }
            "waitcondition" => parse_filter(value, line, table, &mut self.wait_condition),
            "waitconditionand" => {
                parse_group_op(GroupOperator::And, value, line, &mut self.wait_condition)
            }
            "waitconditionor" => {
                parse_group_op(GroupOperator::Or, value, line, &mut self.wait_condition)
            }
            "waitconditionnegate" => {
                self.wait_condition_negate = true;
                Ok(())
            }
            "localtime" => {
                // timestamps are unix everywhere, nothing to adjust
                Ok(())
            }
            "distributed" => {
                self.distributed = parse_on_off(value, line)?;
                Ok(())
            }
            "sendstatsdata" => {
                self.send_stats_data = parse_on_off(value, line)?;
                Ok(())
            }
            _ => Err(LqdError::bad_request_in("unrecognized header", line)),
        }
    }

    fn parse_response_header(&mut self, value: &str, line: &str) -> LqdResult<()> {
        if value != "fixed16" {
            return Err(LqdError::bad_request_in(
                "unrecognized responseformat, only fixed16 is supported",
                line,
            ));
        }
        self.response_fixed16 = true;
        Ok(())
    }

    fn parse_sort_header(&mut self, value: &str, line: &str, table: &Table) -> LqdResult<()> {
        let parts: Vec<&str> = value.split(' ').filter(|p| !p.is_empty()).collect();
        let (name, args, direction) = match parts.as_slice() {
            [name] => (*name, String::new(), "asc"),
            [name, direction] => (*name, String::new(), *direction),
            [name, tag, direction]
                if *name == "custom_variables" || *name == "host_custom_variables" =>
            {
                (*name, tag.to_uppercase(), *direction)
            }
            _ => {
                return Err(LqdError::bad_request_in(
                    "invalid sort header, must be 'Sort: <field> <asc|desc>' \
                     or 'Sort: custom_variables <name> <asc|desc>'",
                    line,
                ));
            }
        };
        let direction = match direction.to_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => {
                return Err(LqdError::bad_request_in(
                    "unrecognized sort direction, must be asc or desc",
                    line,
                ));
            }
        };
        let name = name.to_lowercase();
        let (column, rewritten) = match table.column_with_fallback(&name) {
            Some((col, rewritten)) => (Arc::clone(col), rewritten),
            None => {
                return Err(LqdError::bad_request_in(
                    format!("unrecognized sort column {}", name),
                    line,
                ));
            }
        };
        self.sort.push(SortField {
            name: rewritten.unwrap_or(name),
            direction,
            args,
            column,
        });
        Ok(())
    }
}

impl fmt::Display for Request {
    /// Serializes the request as a normalized LQL query string; parsing the
    /// result yields an equal request.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_command() {
            return write!(f, "{}\n\n", self.command);
        }
        let table = self.table.expect("request without table or command");
        writeln!(f, "GET {}", table)?;
        if self.response_fixed16 {
            writeln!(f, "ResponseHeader: fixed16")?;
        }
        if let Some(format) = self.output_format {
            writeln!(f, "OutputFormat: {}", format.as_str())?;
        }
        if !self.columns.is_empty() {
            writeln!(f, "Columns: {}", self.columns.join(" "))?;
        }
        if !self.backends.is_empty() {
            writeln!(f, "Backends: {}", self.backends.join(" "))?;
        }
        if let Some(limit) = self.limit {
            writeln!(f, "Limit: {}", limit)?;
        }
        if self.offset > 0 {
            writeln!(f, "Offset: {}", self.offset)?;
        }
        if self.send_columns_header {
            writeln!(f, "ColumnHeaders: on")?;
        }
        if self.keep_alive {
            writeln!(f, "KeepAlive: on")?;
        }
        if !self.auth_user.is_empty() {
            writeln!(f, "AuthUser: {}", self.auth_user)?;
        }
        if self.distributed {
            writeln!(f, "Distributed: on")?;
        }
        if self.send_stats_data {
            writeln!(f, "SendStatsData: on")?;
        }
        for filter in &self.filter {
            write!(f, "{}", filter.to_lql(""))?;
        }
        for stats in &self.stats {
            write!(f, "{}", stats.to_lql("Stats"))?;
        }
        if !self.wait_trigger.is_empty() {
            writeln!(f, "WaitTrigger: {}", self.wait_trigger)?;
        }
        if !self.wait_object.is_empty() {
            writeln!(f, "WaitObject: {}", self.wait_object)?;
        }
        if self.wait_timeout > 0 {
            writeln!(f, "WaitTimeout: {}", self.wait_timeout)?;
        }
        if self.wait_condition_negate {
            writeln!(f, "WaitConditionNegate:")?;
        }
        for condition in &self.wait_condition {
            write!(f, "{}", condition.to_lql("WaitCondition"))?;
        }
        for sort in &self.sort {
            if sort.args.is_empty() {
                writeln!(f, "Sort: {} {}", sort.name, sort.direction.as_str())?;
            } else {
                writeln!(
                    f,
                    "Sort: {} {} {}",
                    sort.name,
                    sort.args,
                    sort.direction.as_str()
                )?;
            }
        }
        writeln!(f)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(' ')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_non_negative(value: &str, line: &str) -> LqdResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| LqdError::bad_request_in("expecting a positive number", line))
}

fn parse_on_off(value: &str, line: &str) -> LqdResult<bool> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(LqdError::bad_request_in("must be 'on' or 'off'", line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lqd_schema::Catalog;

    fn catalog() -> Catalog {
        Catalog::new()
    }

    #[test]
    fn test_parse_round_trip() {
        let catalog = catalog();
        let queries = [
            "GET hosts\n\n",
            "GET hosts\nColumns: name state\n\n",
            "GET hosts\nColumns: name state\nFilter: state != 1\n\n",
            "GET hosts\nOutputFormat: wrapped_json\nColumnHeaders: on\n\n",
            "GET hosts\nResponseHeader: fixed16\n\n",
            "GET hosts\nColumns: name state\nFilter: state != 1\nFilter: is_executing = 1\nOr: 2\n\n",
            "GET hosts\nColumns: name state\nFilter: state != 1\nFilter: is_executing = 1\nAnd: 2\nFilter: state = 1\nOr: 2\nFilter: name = test\n\n",
            "GET hosts\nBackends: mockid0\n\n",
            "GET hosts\nLimit: 25\nOffset: 5\n\n",
            "GET hosts\nSort: name asc\nSort: state desc\n\n",
            "GET hosts\nStats: state = 1\nStats: avg latency\nStats: state = 3\nStats: state != 1\nStatsAnd: 2\n\n",
            "GET hosts\nColumns: name\nFilter: name ~~ test\n\n",
            "GET hosts\nColumns: name\nFilter: name !~ Test\n\n",
            "GET hosts\nColumns: name\nFilter: name !~~ test\n\n",
            "GET hosts\nColumns: name\nFilter: custom_variables ~~ TAGS test\n\n",
            "GET hosts\nColumns: name\nFilter: custom_variables = TAGS\n\n",
            "GET hosts\nColumns: name\nFilter: name !=\n\n",
            "COMMAND [123456] TEST\n\n",
            "GET hosts\nColumns: name\nFilter: name = test\nWaitTrigger: all\nWaitObject: test\nWaitTimeout: 10000\nWaitCondition: last_check > 1473760401\n\n",
            "GET hosts\nColumns: name\nFilter: latency != 1.23456789012345\n\n",
            "GET hosts\nColumns: name comments\nFilter: comments >= 1\n\n",
            "GET hosts\nColumns: name contact_groups\nFilter: contact_groups >= test\n\n",
            "GET hosts\nColumns: name\nFilter: last_check >= 123456789\n\n",
            "GET hosts\nColumns: name\nFilter: last_check =\n\n",
            "GET hosts\nAuthUser: testUser\n\n",
        ];
        for query in queries {
            let req = Request::parse(query, &catalog).unwrap();
            assert_eq!(req.to_string(), query, "normalized form differs");
            // one normalization pass is a fixpoint
            let again = Request::parse(&req.to_string(), &catalog).unwrap();
            assert_eq!(again.to_string(), req.to_string());
        }
    }

    #[test]
    fn test_parse_basics() {
        let catalog = catalog();
        let req = Request::parse("GET hosts\nLimit: 10\nOffset: 3\n\n", &catalog).unwrap();
        assert_eq!(req.table, Some(TableName::Hosts));
        assert_eq!(req.limit, Some(10));
        assert_eq!(req.offset, 3);

        let req = Request::parse("GET hosts\nColumns: name state\n\n", &catalog).unwrap();
        assert_eq!(req.columns, vec!["name", "state"]);
    }

    #[test]
    fn test_parse_sort_binds_columns() {
        let catalog = catalog();
        let req = Request::parse(
            "GET hosts\nColumns: latency state name\nSort: name desc\nSort: state asc\n\n",
            &catalog,
        )
        .unwrap();
        assert_eq!(req.sort[0].name, "name");
        assert_eq!(req.sort[0].direction, SortDirection::Desc);
        assert_eq!(req.sort[0].column.name, "name");
        assert_eq!(req.sort[1].direction, SortDirection::Asc);

        let req = Request::parse(
            "GET hosts\nColumns: name custom_variables\nSort: custom_variables TEST asc\n\n",
            &catalog,
        )
        .unwrap();
        assert_eq!(req.sort[0].args, "TEST");
    }

    #[test]
    fn test_parse_filter_stack() {
        let catalog = catalog();
        let req = Request::parse(
            "GET hosts\nFilter: state != 1\nFilter: name = with spaces \n\n",
            &catalog,
        )
        .unwrap();
        assert_eq!(req.filter.len(), 2);
        assert_eq!(req.filter[1].str_value, "with spaces");

        let req = Request::parse(
            "GET hosts\nFilter: state != 1\nFilter: name = test\nOr: 2\n\n",
            &catalog,
        )
        .unwrap();
        assert_eq!(req.filter.len(), 1);
        assert_eq!(req.filter[0].filters.len(), 2);
        assert_eq!(req.filter[0].group_op, Some(GroupOperator::Or));
    }

    #[test]
    fn test_parse_negate_flips_top() {
        let catalog = catalog();
        let req = Request::parse("GET hosts\nFilter: state = 1\nNegate:\n\n", &catalog).unwrap();
        assert!(req.filter[0].negate);
        let req = Request::parse(
            "GET hosts\nFilter: state = 1\nNegate:\nNegate:\n\n",
            &catalog,
        )
        .unwrap();
        assert!(!req.filter[0].negate);
    }

    #[test]
    fn test_prefixed_column_names_are_rewritten() {
        let catalog = catalog();
        let req = Request::parse("GET hosts\nColumns: host_name alias\n\n", &catalog).unwrap();
        assert_eq!(req.columns, vec!["name", "alias"]);

        let req = Request::parse(
            "GET hostgroups\nFilter: hostgroup_name = host_1\n\n",
            &catalog,
        )
        .unwrap();
        assert_eq!(req.filter[0].column.as_ref().unwrap().name, "name");
    }

    #[test]
    fn test_unknown_projection_column_is_kept() {
        let catalog = catalog();
        let req = Request::parse("GET hosts\nColumns: name does_not_exist\n\n", &catalog).unwrap();
        assert_eq!(req.columns, vec!["name", "does_not_exist"]);
    }

    #[test]
    fn test_parse_errors() {
        let catalog = catalog();
        let cases = [
            ("", "bad request: empty request"),
            ("NOE", "bad request: NOE"),
            (
                "GET none\nColumns: none\n\n",
                "bad request: table none does not exist",
            ),
            ("GET hosts\nnone\n\n", "bad request: syntax error in: none"),
            (
                "GET hosts\nNone: blah\n\n",
                "bad request: unrecognized header in: None: blah",
            ),
            (
                "GET hosts\nLimit: x\n\n",
                "bad request: expecting a positive number in: Limit: x",
            ),
            (
                "GET hosts\nLimit: -1\n\n",
                "bad request: expecting a positive number in: Limit: -1",
            ),
            (
                "GET hosts\nOffset: -1\n\n",
                "bad request: expecting a positive number in: Offset: -1",
            ),
            (
                "GET hosts\nSort: name none\n\n",
                "bad request: unrecognized sort direction, must be asc or desc in: Sort: name none",
            ),
            (
                "GET hosts\nResponseheader: none\n\n",
                "bad request: unrecognized responseformat, only fixed16 is supported in: Responseheader: none",
            ),
            (
                "GET hosts\nOutputFormat: csv\n\n",
                "bad request: unrecognized outputformat, choose from json, wrapped_json and python in: OutputFormat: csv",
            ),
            (
                "GET hosts\nStatsAnd: 1\n\n",
                "bad request: not enough filter on stack in: StatsAnd: 1",
            ),
            (
                "GET hosts\nStatsOr: 1\n\n",
                "bad request: not enough filter on stack in: StatsOr: 1",
            ),
            (
                "GET hosts\nFilter: name\n\n",
                "bad request: filter header must be Filter: <field> <operator> <value> in: Filter: name",
            ),
            (
                "GET hosts\nStats: name\n\n",
                "bad request: stats header, must be Stats: <field> <operator> <value> OR Stats: <sum|avg|min|max> <field> in: Stats: name",
            ),
            (
                "GET hosts\nStats: avg none\n\n",
                "bad request: unrecognized column from stats: none in: Stats: avg none",
            ),
            (
                "GET hosts\nFilter: name !=\nAnd: x\n\n",
                "bad request: And must be a positive number in: And: x",
            ),
            (
                "GET hosts\nKeepalive: broke\n\n",
                "bad request: must be 'on' or 'off' in: Keepalive: broke",
            ),
            ("COMMAND [123.456] test_broken", "bad request: COMMAND [123.456] test_broken"),
        ];
        for (query, expected) in cases {
            let err = Request::parse(query, &catalog).unwrap_err();
            assert_eq!(err.to_string(), expected, "query: {:?}", query);
        }
    }

    #[test]
    fn test_command_with_backends() {
        let catalog = catalog();
        let req = Request::parse(
            "COMMAND [1473627610] SCHEDULE_FORCED_SVC_CHECK;demo;Web1;1473627610\nBackends: mockid0\n\n",
            &catalog,
        )
        .unwrap();
        assert!(req.is_command());
        assert_eq!(req.backends, vec!["mockid0"]);
        assert_eq!(
            req.command,
            "COMMAND [1473627610] SCHEDULE_FORCED_SVC_CHECK;demo;Web1;1473627610"
        );
    }

    #[test]
    fn test_stats_zero_group_degrades_to_counter() {
        let catalog = catalog();
        let req = Request::parse(
            "GET hosts\nStats: sum latency\nStatsAnd: 0\n\n",
            &catalog,
        )
        .unwrap();
        assert_eq!(req.stats.len(), 2);
        assert_eq!(req.stats[1].stats_type, crate::filter::StatsType::Counter);
        assert_eq!(req.stats[1].float_value, 9999.0);
    }

    #[test]
    fn test_internal_headers() {
        let catalog = catalog();
        let req = Request::parse(
            "GET hosts\nColumns: name\nDistributed: on\nSendStatsData: on\n\n",
            &catalog,
        )
        .unwrap();
        assert!(req.distributed);
        assert!(req.send_stats_data);
    }
}

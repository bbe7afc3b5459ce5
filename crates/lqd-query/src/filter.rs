//! Typed filter objects, group operators and stats accumulators.

use std::fmt::Write as _;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use lqd_common::{LqdError, LqdResult};
use lqd_schema::{Column, DataType, Table};
use lqd_store::{DataRow, PeerView};

/// A filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Equal,
    /// `!=`
    Unequal,
    /// `=~` case-insensitive equality
    EqualNocase,
    /// `!=~`
    UnequalNocase,
    /// `~` regex match
    RegexMatch,
    /// `!~`
    RegexMatchNot,
    /// `~~` case-insensitive regex match
    RegexNoCaseMatch,
    /// `!~~`
    RegexNoCaseMatchNot,
    /// `<`
    Less,
    /// `<=`
    LessThan,
    /// `>`
    Greater,
    /// `>=`; on lists: contains
    GreaterThan,
    /// `!>=`; on lists: does not contain
    GroupContainsNot,
}

impl Operator {
    /// Parses an operator token; the second return tells whether the value
    /// must compile as a regex.
    pub(crate) fn parse(token: &str) -> Option<(Operator, bool)> {
        let op = match token {
            "=" => (Self::Equal, false),
            "!=" => (Self::Unequal, false),
            "=~" => (Self::EqualNocase, false),
            "!=~" => (Self::UnequalNocase, false),
            "~" => (Self::RegexMatch, true),
            "!~" => (Self::RegexMatchNot, true),
            "~~" => (Self::RegexNoCaseMatch, true),
            "!~~" => (Self::RegexNoCaseMatchNot, true),
            "<" => (Self::Less, false),
            "<=" => (Self::LessThan, false),
            ">" => (Self::Greater, false),
            ">=" => (Self::GreaterThan, false),
            "!>=" => (Self::GroupContainsNot, false),
            _ => return None,
        };
        Some(op)
    }

    /// The wire token of this operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Unequal => "!=",
            Self::EqualNocase => "=~",
            Self::UnequalNocase => "!=~",
            Self::RegexMatch => "~",
            Self::RegexMatchNot => "!~",
            Self::RegexNoCaseMatch => "~~",
            Self::RegexNoCaseMatchNot => "!~~",
            Self::Less => "<",
            Self::LessThan => "<=",
            Self::Greater => ">",
            Self::GreaterThan => ">=",
            Self::GroupContainsNot => "!>=",
        }
    }
}

/// Boolean combinator for filter groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOperator {
    /// All children must match; short-circuits on the first false.
    And,
    /// Any child suffices; short-circuits on the first true.
    Or,
}

impl GroupOperator {
    /// The header name of this combinator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "And",
            Self::Or => "Or",
        }
    }
}

/// The aggregation role of a stats filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatsType {
    /// Plain filter, no aggregation.
    #[default]
    None,
    /// Counts matching rows.
    Counter,
    /// Sum of the column.
    Sum,
    /// Average of the column.
    Average,
    /// Minimum of the column; starts at `-1`, not +inf, so the first real
    /// observation becomes the minimum. Downstream consumers rely on the
    /// `-1` of an empty result.
    Min,
    /// Maximum of the column.
    Max,
}

impl StatsType {
    /// Initial accumulator value.
    #[must_use]
    pub const fn initial(self) -> f64 {
        match self {
            Self::Min => -1.0,
            _ => 0.0,
        }
    }

    /// The keyword in a `Stats:` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Counter | Self::None => "",
        }
    }
}

/// A single filter: either a leaf comparison against one column or a group
/// of child filters. A filter may additionally carry a stats role with its
/// accumulator.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Column of a leaf filter.
    pub column: Option<Arc<Column>>,
    /// Comparison operator of a leaf filter.
    pub operator: Operator,
    /// Textual comparison value.
    pub str_value: String,
    /// Parsed numeric comparison value.
    pub float_value: f64,
    /// Compiled pattern for regex operators.
    pub regex: Option<Regex>,
    /// Variable name for hashmap and custom-variable columns.
    pub custom_tag: String,
    /// True when the filter value was empty.
    pub is_empty: bool,
    /// Applied after the base match.
    pub negate: bool,
    /// Set for group filters.
    pub group_op: Option<GroupOperator>,
    /// Children of a group filter.
    pub filters: Vec<Filter>,
    /// Aggregation role.
    pub stats_type: StatsType,
    /// Accumulator.
    pub stats: f64,
    /// Number of observations.
    pub stats_count: i64,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            column: None,
            operator: Operator::Equal,
            str_value: String::new(),
            float_value: 0.0,
            regex: None,
            custom_tag: String::new(),
            is_empty: false,
            negate: false,
            group_op: None,
            filters: Vec::new(),
            stats_type: StatsType::None,
            stats: 0.0,
            stats_count: 0,
        }
    }
}

impl Filter {
    /// Returns true if this filter matches the given row.
    #[must_use]
    pub fn matches(&self, row: &DataRow, view: &PeerView<'_>) -> bool {
        let result = self.matches_inner(row, view);
        if self.negate {
            !result
        } else {
            result
        }
    }

    fn matches_inner(&self, row: &DataRow, view: &PeerView<'_>) -> bool {
        if let Some(op) = self.group_op {
            for child in &self.filters {
                let matched = child.matches(row, view);
                match op {
                    GroupOperator::And if !matched => return false,
                    GroupOperator::Or if matched => return true,
                    _ => {}
                }
            }
            return op == GroupOperator::And;
        }

        let col = self.column.as_ref().expect("leaf filter without column");
        // Optional columns a peer does not deliver are matched against the
        // table's empty column instead of erroring.
        if !col.available_for(view.flags()) {
            let empty = view.table(col.table).empty_column();
            return self.match_leaf(empty, row, view);
        }
        self.match_leaf(col, row, view)
    }

    fn match_leaf(&self, col: &Column, row: &DataRow, view: &PeerView<'_>) -> bool {
        match col.data_type {
            DataType::String | DataType::LargeString => {
                self.match_string(&row.get_string(col, view))
            }
            DataType::StringList => self.match_string_list(&row.get_string_list(col, view)),
            DataType::Int | DataType::Int64 => {
                if self.is_empty {
                    self.match_empty_value()
                } else {
                    self.match_int(row.get_int(col, view))
                }
            }
            DataType::Float => {
                if self.is_empty {
                    self.match_empty_value()
                } else {
                    self.match_float(row.get_float(col, view))
                }
            }
            DataType::Int64List => self.match_int_list(&row.get_int64_list(col, view)),
            DataType::HashMap | DataType::CustomVar => {
                let map = row.get_hash_map(col, view);
                let value = map.get(&self.custom_tag).map(String::as_str).unwrap_or("");
                self.match_string(value)
            }
            DataType::ServiceMemberList | DataType::InterfaceList => {
                warn!("unsupported filter on column {}", col.name);
                false
            }
        }
    }

    fn match_string(&self, value: &str) -> bool {
        match self.operator {
            Operator::Equal => value == self.str_value,
            Operator::Unequal => value != self.str_value,
            Operator::EqualNocase => value.to_lowercase() == self.str_value.to_lowercase(),
            Operator::UnequalNocase => value.to_lowercase() != self.str_value.to_lowercase(),
            Operator::RegexMatch => self.regex_match(value),
            Operator::RegexMatchNot => !self.regex_match(value),
            Operator::RegexNoCaseMatch => self.regex_match(&value.to_lowercase()),
            Operator::RegexNoCaseMatchNot => !self.regex_match(&value.to_lowercase()),
            Operator::Less => value < self.str_value.as_str(),
            Operator::LessThan => value <= self.str_value.as_str(),
            Operator::Greater => value > self.str_value.as_str(),
            Operator::GreaterThan => value >= self.str_value.as_str(),
            Operator::GroupContainsNot => {
                warn!("operator {} not implemented for strings", self.operator.as_str());
                false
            }
        }
    }

    fn regex_match(&self, value: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(value))
    }

    fn match_int(&self, value: i64) -> bool {
        let expect = self.float_value as i64;
        match self.operator {
            Operator::Equal => value == expect,
            Operator::Unequal => value != expect,
            Operator::Less => value < expect,
            Operator::LessThan => value <= expect,
            Operator::Greater => value > expect,
            Operator::GreaterThan => value >= expect,
            other => {
                warn!("operator {} not implemented for ints", other.as_str());
                false
            }
        }
    }

    fn match_float(&self, value: f64) -> bool {
        match self.operator {
            Operator::Equal => value == self.float_value,
            Operator::Unequal => value != self.float_value,
            Operator::Less => value < self.float_value,
            Operator::LessThan => value <= self.float_value,
            Operator::Greater => value > self.float_value,
            Operator::GreaterThan => value >= self.float_value,
            other => {
                warn!("operator {} not implemented for floats", other.as_str());
                false
            }
        }
    }

    /// An empty numeric filter value never satisfies equality and always
    /// satisfies the upward inequalities.
    fn match_empty_value(&self) -> bool {
        match self.operator {
            Operator::Unequal | Operator::Greater | Operator::GreaterThan => true,
            Operator::Equal | Operator::Less | Operator::LessThan => false,
            other => {
                warn!("operator {} not implemented for empty values", other.as_str());
                false
            }
        }
    }

    fn match_string_list(&self, list: &[String]) -> bool {
        match self.operator {
            // matches the empty list, like: contacts = ""
            Operator::Equal => self.str_value.is_empty() && list.is_empty(),
            // matches any non-empty list, like: contacts != ""
            Operator::Unequal => self.str_value.is_empty() && !list.is_empty(),
            Operator::GreaterThan => list.iter().any(|item| *item == self.str_value),
            Operator::GroupContainsNot => list.iter().all(|item| *item != self.str_value),
            Operator::RegexMatch | Operator::RegexNoCaseMatch => {
                list.iter().any(|item| self.match_string(item))
            }
            Operator::RegexMatchNot | Operator::RegexNoCaseMatchNot => {
                !list.iter().any(|item| self.match_string(item))
            }
            other => {
                warn!("operator {} not implemented for lists", other.as_str());
                false
            }
        }
    }

    fn match_int_list(&self, list: &[i64]) -> bool {
        match self.operator {
            Operator::Equal => self.is_empty && list.is_empty(),
            Operator::Unequal => self.is_empty && !list.is_empty(),
            Operator::GreaterThan => list.contains(&(self.float_value as i64)),
            Operator::GroupContainsNot => !list.contains(&(self.float_value as i64)),
            other => {
                warn!("operator {} not implemented for int lists", other.as_str());
                false
            }
        }
    }

    /// Adds one observation to this stats filter.
    pub fn apply_value(&mut self, value: f64, count: i64) {
        match self.stats_type {
            StatsType::Counter => self.stats += count as f64,
            StatsType::Sum | StatsType::Average => self.stats += value,
            StatsType::Min => {
                if self.stats > value || self.stats == -1.0 {
                    self.stats = value;
                }
            }
            StatsType::Max => {
                if self.stats < value {
                    self.stats = value;
                }
            }
            StatsType::None => panic!("apply_value on a plain filter"),
        }
        self.stats_count += count;
    }

    /// The final aggregate of this stats slot.
    #[must_use]
    pub fn result(&self) -> f64 {
        match self.stats_type {
            StatsType::Average => {
                if self.stats_count > 0 {
                    self.stats / self.stats_count as f64
                } else {
                    0.0
                }
            }
            _ => self.stats,
        }
    }

    /// A short label for this stats slot in column headers.
    #[must_use]
    pub fn stats_label(&self) -> String {
        match self.stats_type {
            StatsType::Counter => format!(
                "{} {}{}",
                self.column.as_ref().map(|c| c.name.as_str()).unwrap_or(""),
                self.operator.as_str(),
                self.display_value_suffix()
            ),
            _ => format!(
                "{} {}",
                self.stats_type.as_str(),
                self.column.as_ref().map(|c| c.name.as_str()).unwrap_or("")
            ),
        }
    }

    fn display_value(&self) -> String {
        let Some(col) = self.column.as_ref() else {
            return String::new();
        };
        if self.is_empty {
            return self.custom_tag.clone();
        }
        match col.data_type {
            DataType::HashMap | DataType::CustomVar => {
                format!("{} {}", self.custom_tag, self.str_value)
            }
            DataType::Int | DataType::Int64 | DataType::Int64List => {
                (self.float_value as i64).to_string()
            }
            DataType::Float => self.float_value.to_string(),
            _ => self.str_value.clone(),
        }
    }

    fn display_value_suffix(&self) -> String {
        let value = self.display_value();
        if value.is_empty() {
            value
        } else {
            format!(" {}", value)
        }
    }

    /// Serializes this filter back into header lines. `prefix` is empty for
    /// plain filters and `WaitCondition` for wait conditions.
    #[must_use]
    pub fn to_lql(&self, prefix: &str) -> String {
        let mut out = String::new();
        if let Some(op) = self.group_op {
            for child in &self.filters {
                out.push_str(&child.to_lql(prefix));
            }
            let _ = writeln!(out, "{}{}: {}", prefix, op.as_str(), self.filters.len());
            return out;
        }

        match self.stats_type {
            StatsType::None => {
                let prefix = if prefix.is_empty() { "Filter" } else { prefix };
                let _ = writeln!(
                    out,
                    "{}: {} {}{}",
                    prefix,
                    self.column.as_ref().map(|c| c.name.as_str()).unwrap_or(""),
                    self.operator.as_str(),
                    self.display_value_suffix()
                );
                if self.negate {
                    out.push_str("Negate:\n");
                }
            }
            StatsType::Counter => {
                let _ = writeln!(
                    out,
                    "Stats: {} {}{}",
                    self.column.as_ref().map(|c| c.name.as_str()).unwrap_or(""),
                    self.operator.as_str(),
                    self.display_value_suffix()
                );
            }
            aggregate => {
                let _ = writeln!(
                    out,
                    "Stats: {} {}",
                    aggregate.as_str(),
                    self.column.as_ref().map(|c| c.name.as_str()).unwrap_or("")
                );
            }
        }
        out
    }
}

/// Parses one `Filter:` header value and pushes the filter onto the stack.
pub(crate) fn parse_filter(
    value: &str,
    line: &str,
    table: &Table,
    stack: &mut Vec<Filter>,
) -> LqdResult<()> {
    let mut parts = value.splitn(3, ' ');
    let column_name = parts.next().unwrap_or("");
    let Some(op_token) = parts.next() else {
        return Err(LqdError::bad_request_in(
            "filter header must be Filter: <field> <operator> <value>",
            line,
        ));
    };
    // filters are allowed to have an empty value
    let str_value = parts.next().unwrap_or("");

    let Some((operator, is_regex)) = Operator::parse(op_token) else {
        return Err(LqdError::bad_request_in(
            format!("unrecognized filter operator: {}", op_token),
            line,
        ));
    };
    let Some((col, _)) = table.column_with_fallback(column_name) else {
        return Err(LqdError::bad_request_in(
            format!("unrecognized column {}", column_name),
            line,
        ));
    };

    let mut filter = Filter {
        column: Some(Arc::clone(col)),
        operator,
        ..Filter::default()
    };
    filter.set_value(str_value, line)?;

    if is_regex {
        let mut pattern = filter.str_value.clone();
        if matches!(
            operator,
            Operator::RegexNoCaseMatch | Operator::RegexNoCaseMatchNot
        ) {
            pattern = pattern.to_lowercase();
        }
        let regex = Regex::new(&pattern).map_err(|err| {
            LqdError::bad_request_in(format!("invalid regular expression: {}", err), line)
        })?;
        filter.regex = Some(regex);
    }
    stack.push(filter);
    Ok(())
}

impl Filter {
    /// Converts the text value into the column's typed value.
    fn set_value(&mut self, str_value: &str, line: &str) -> LqdResult<()> {
        let col = self.column.as_ref().expect("leaf filter without column");
        if str_value.is_empty() {
            self.is_empty = true;
        }
        match col.data_type {
            DataType::Int | DataType::Int64 | DataType::Int64List => {
                match str_value.parse::<i64>() {
                    Ok(v) => self.float_value = v as f64,
                    Err(_) if self.is_empty => {}
                    Err(_) => {
                        return Err(LqdError::bad_request_in(
                            format!("could not convert {} to integer from filter", str_value),
                            line,
                        ));
                    }
                }
            }
            DataType::Float => match str_value.parse::<f64>() {
                Ok(v) => self.float_value = v,
                Err(_) if self.is_empty => {}
                Err(_) => {
                    return Err(LqdError::bad_request_in(
                        format!("could not convert {} to float from filter", str_value),
                        line,
                    ));
                }
            },
            DataType::HashMap | DataType::CustomVar => {
                let mut vars = str_value.splitn(2, ' ');
                let tag = vars.next().unwrap_or("");
                if tag.is_empty() {
                    return Err(LqdError::bad_request_in(
                        "custom variable filter must have form \
                         \"Filter: custom_variables <op> <variable> [<value>]\"",
                        line,
                    ));
                }
                match vars.next() {
                    Some(value) => self.str_value = value.to_string(),
                    None => self.is_empty = true,
                }
                self.custom_tag = tag.to_string();
            }
            _ => self.str_value = str_value.to_string(),
        }
        Ok(())
    }
}

/// Parses one `Stats:` header value: either an aggregate keyword plus a
/// column, or filter syntax that becomes a counter.
pub(crate) fn parse_stats(
    value: &str,
    line: &str,
    table: &Table,
    stack: &mut Vec<Filter>,
) -> LqdResult<()> {
    let mut parts = value.splitn(2, ' ');
    let keyword = parts.next().unwrap_or("");
    let Some(rest) = parts.next() else {
        return Err(LqdError::bad_request_in(
            "stats header, must be Stats: <field> <operator> <value> \
             OR Stats: <sum|avg|min|max> <field>",
            line,
        ));
    };

    let stats_type = match keyword.to_lowercase().as_str() {
        "avg" => StatsType::Average,
        "min" => StatsType::Min,
        "max" => StatsType::Max,
        "sum" => StatsType::Sum,
        _ => {
            parse_filter(value, line, table, stack)?;
            let counter = stack.last_mut().expect("filter just pushed");
            counter.stats_type = StatsType::Counter;
            return Ok(());
        }
    };

    let Some(col) = table.column(rest) else {
        return Err(LqdError::bad_request_in(
            format!("unrecognized column from stats: {}", rest),
            line,
        ));
    };
    stack.push(Filter {
        column: Some(Arc::clone(col)),
        stats_type,
        stats: stats_type.initial(),
        ..Filter::default()
    });
    Ok(())
}

/// Parses a postfix group header like `And: <n>`: pops `n` filters off the
/// stack and pushes a group. `n = 0` is ignored.
pub(crate) fn parse_group_op(
    op: GroupOperator,
    value: &str,
    line: &str,
    stack: &mut Vec<Filter>,
) -> LqdResult<()> {
    let count: usize = value.parse().map_err(|_| {
        LqdError::bad_request_in(format!("{} must be a positive number", op.as_str()), line)
    })?;
    if count == 0 {
        return Ok(());
    }
    if stack.len() < count {
        return Err(LqdError::bad_request_in("not enough filter on stack", line));
    }
    let children = stack.split_off(stack.len() - count);
    stack.push(Filter {
        group_op: Some(op),
        filters: children,
        ..Filter::default()
    });
    Ok(())
}

/// Parses `StatsAnd:`/`StatsOr:` headers. A zero count degrades to a
/// constant-true counter when the table has a `state` column.
pub(crate) fn parse_stats_op(
    op: GroupOperator,
    value: &str,
    line: &str,
    table: &Table,
    stack: &mut Vec<Filter>,
) -> LqdResult<()> {
    if value.parse::<usize>() == Ok(0) {
        if table.column("state").is_some() {
            parse_stats("state != 9999", line, table, stack)?;
        }
        return Ok(());
    }
    parse_group_op(op, value, line, stack)?;
    let group = stack.last_mut().expect("group just pushed");
    group.stats_type = StatsType::Counter;
    Ok(())
}

/// Clones the stats slots of a request with fresh accumulators; the zero
/// element of the distributed merge.
#[must_use]
pub fn create_local_stats_copy(stats: &[Filter]) -> Vec<Filter> {
    stats
        .iter()
        .map(|f| {
            let mut copy = f.clone();
            copy.stats = f.stats_type.initial();
            copy.stats_count = 0;
            copy
        })
        .collect()
}

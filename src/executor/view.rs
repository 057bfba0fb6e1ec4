//! The in-memory relation passed between relational operators.
//!
//! A [`View`] is an ordered header of qualified fields plus an ordered
//! multiset of records. Cells hold one scalar, or a group of scalars once
//! GROUP BY has collapsed rows. Operators mutate a view in place and the
//! final [`View::fix`] projects it down to its select list.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::config::Encoding;
use crate::error::{Error, ErrorKind, Position, Result};
use crate::storage::value::Value;
use crate::utils::adt::cast::to_number;
use crate::utils::adt::comparison::identity_key;
use crate::utils::adt::datetime::epoch_nanos;

/// Reserved pseudo-column providing stable row identity for DML write-back.
pub const INTERNAL_ID_COLUMN: &str = "@__internal_id";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeaderField {
    pub view: String,
    pub column: String,
    pub aliases: Vec<String>,
    /// 1-based position within the field's source view; 0 for synthesized
    /// columns.
    pub number: usize,
    pub is_from_table: bool,
    pub is_group_key: bool,
    pub is_join_column: bool,
}

impl HeaderField {
    pub fn is_internal_id(&self) -> bool {
        self.column == INTERNAL_ID_COLUMN
    }

    /// The output name: the first alias when one was assigned, else the
    /// column name.
    pub fn output_name(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or(&self.column)
    }

    fn matches_column(&self, name: &str) -> bool {
        self.column.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Failed header lookups, turned into positioned errors by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLookup {
    NotExist,
    Ambiguous,
}

impl FieldLookup {
    pub fn into_error(self, label: &str, pos: Position) -> Error {
        let kind = match self {
            FieldLookup::NotExist => ErrorKind::FieldNotExist(label.to_string()),
            FieldLookup::Ambiguous => ErrorKind::FieldAmbiguous(label.to_string()),
        };
        Error::new(pos, kind)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header(Vec<HeaderField>);

impl Header {
    pub fn new(view: &str, columns: &[&str]) -> Header {
        Header(
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| HeaderField {
                    view: view.to_string(),
                    column: (*column).to_string(),
                    number: i + 1,
                    is_from_table: true,
                    ..HeaderField::default()
                })
                .collect(),
        )
    }

    /// Like [`Header::new`] with the InternalId pseudo-column prepended.
    pub fn with_id(view: &str, columns: &[&str]) -> Header {
        let mut fields = vec![HeaderField {
            view: view.to_string(),
            column: INTERNAL_ID_COLUMN.to_string(),
            ..HeaderField::default()
        }];
        fields.extend(Header::new(view, columns).0);
        Header(fields)
    }

    pub fn from_fields(fields: Vec<HeaderField>) -> Header {
        Header(fields)
    }

    pub fn merge(lhs: Header, rhs: Header) -> Header {
        let mut fields = lhs.0;
        fields.extend(rhs.0);
        Header(fields)
    }

    /// Rename every field's view qualifier, e.g. when an alias is applied
    /// to a loaded table or subquery.
    pub fn update_view_name(&mut self, name: &str) {
        for field in &mut self.0 {
            field.view = name.to_string();
        }
    }

    pub fn push(&mut self, field: HeaderField) {
        self.0.push(field);
    }

    /// Case-insensitive search by optional view qualifier and column name.
    pub fn search_index(
        &self,
        view: Option<&str>,
        column: &str,
    ) -> std::result::Result<usize, FieldLookup> {
        let mut found: Option<usize> = None;
        for (idx, field) in self.0.iter().enumerate() {
            let matched = match view {
                Some(view) => {
                    field.view.eq_ignore_ascii_case(view) && field.matches_column(column)
                }
                None => field.matches_column(column),
            };
            if matched {
                if found.is_some() {
                    return Err(FieldLookup::Ambiguous);
                }
                found = Some(idx);
            }
        }
        found.ok_or(FieldLookup::NotExist)
    }

    /// Resolve `view.N` positional references.
    pub fn search_number(
        &self,
        view: &str,
        number: i64,
    ) -> std::result::Result<usize, FieldLookup> {
        if number < 1 {
            return Err(FieldLookup::NotExist);
        }
        self.0
            .iter()
            .position(|field| {
                field.is_from_table
                    && field.number == number as usize
                    && field.view.eq_ignore_ascii_case(view)
            })
            .ok_or(FieldLookup::NotExist)
    }
}

impl Deref for Header {
    type Target = [HeaderField];

    fn deref(&self) -> &[HeaderField] {
        &self.0
    }
}

impl DerefMut for Header {
    fn deref_mut(&mut self) -> &mut [HeaderField] {
        &mut self.0
    }
}

static NULL_VALUE: Value = Value::Null;

/// One column position of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Single(Value),
    Group(Vec<Value>),
}

impl Cell {
    /// The representative scalar: the value itself, or the first member of
    /// a group cell (group keys share one value across the group).
    pub fn value(&self) -> &Value {
        match self {
            Cell::Single(v) => v,
            Cell::Group(values) => values.first().unwrap_or(&NULL_VALUE),
        }
    }

    pub fn group_values(&self) -> &[Value] {
        match self {
            Cell::Single(v) => std::slice::from_ref(v),
            Cell::Group(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Cell::Single(_) => 1,
            Cell::Group(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type Record = Vec<Cell>;
pub type RecordSet = Vec<Record>;

pub fn new_record(values: Vec<Value>) -> Record {
    values.into_iter().map(Cell::Single).collect()
}

pub fn new_record_with_id(id: i64, values: Vec<Value>) -> Record {
    let mut record = Vec::with_capacity(values.len() + 1);
    record.push(Cell::Single(Value::Integer(id)));
    record.extend(values.into_iter().map(Cell::Single));
    record
}

/// Where a persisted view came from, and the restore point used by
/// transaction control.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub delimiter: u8,
    pub encoding: Encoding,
    pub no_header: bool,
    pub is_temporary: bool,
    pub restore_header: Option<Header>,
    pub restore_records: Option<RecordSet>,
}

impl FileInfo {
    pub fn new(path: PathBuf, delimiter: u8, encoding: Encoding, no_header: bool) -> FileInfo {
        FileInfo {
            path,
            delimiter,
            encoding,
            no_header,
            is_temporary: false,
            restore_header: None,
            restore_records: None,
        }
    }

    pub fn temporary(name: &str) -> FileInfo {
        FileInfo {
            path: PathBuf::from(name),
            delimiter: b',',
            encoding: Encoding::Utf8,
            no_header: false,
            is_temporary: true,
            restore_header: None,
            restore_records: None,
        }
    }
}

/// A sort key computed once per record and cached for WITH TIES reuse.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Null,
    Number(f64),
    Datetime(i64),
    Boolean(bool),
    String(String),
}

impl SortValue {
    pub fn from_value(value: &Value) -> SortValue {
        if value.is_null() {
            return SortValue::Null;
        }
        if let Some(n) = to_number(value) {
            return SortValue::Number(n.as_f64());
        }
        match value {
            Value::Datetime(dt) => SortValue::Datetime(epoch_nanos(dt)),
            Value::Boolean(b) => SortValue::Boolean(*b),
            Value::Ternary(t) => match t.as_bool() {
                Some(b) => SortValue::Boolean(b),
                None => SortValue::Null,
            },
            Value::String(s) => {
                if let Some(dt) = crate::utils::adt::datetime::parse_datetime(s) {
                    SortValue::Datetime(epoch_nanos(&dt))
                } else {
                    SortValue::String(s.trim().to_string())
                }
            }
            _ => SortValue::Null,
        }
    }

    /// Total order inside one type; across types the ranking is numbers,
    /// datetimes, booleans, strings. Null ordering is the caller's concern.
    pub fn base_cmp(&self, other: &SortValue) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let rank = |v: &SortValue| match v {
            SortValue::Null => 0,
            SortValue::Number(_) => 1,
            SortValue::Datetime(_) => 2,
            SortValue::Boolean(_) => 3,
            SortValue::String(_) => 4,
        };
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (SortValue::Datetime(a), SortValue::Datetime(b)) => a.cmp(b),
            (SortValue::Boolean(a), SortValue::Boolean(b)) => a.cmp(b),
            (SortValue::String(a), SortValue::String(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

/// The relation every operator consumes and produces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct View {
    pub header: Header,
    pub record_set: RecordSet,
    pub file_info: Option<FileInfo>,
    pub is_grouped: bool,
    pub use_internal_id: bool,
    /// Projection captured by SELECT, applied by [`View::fix`].
    pub select_fields: Vec<usize>,
    /// Sort keys of the latest ORDER BY, reused by LIMIT WITH TIES.
    pub sort_values: Option<Vec<Vec<SortValue>>>,
    /// Rows affected by the latest DML operation.
    pub operated_records: usize,
}

impl View {
    pub fn new(header: Header, record_set: RecordSet) -> View {
        View {
            header,
            record_set,
            ..View::default()
        }
    }

    /// The one-record, zero-field relation behind `FROM DUAL`.
    pub fn dual() -> View {
        View {
            header: Header::default(),
            record_set: vec![Vec::new()],
            ..View::default()
        }
    }

    pub fn field_len(&self) -> usize {
        self.header.len()
    }

    pub fn record_len(&self) -> usize {
        self.record_set.len()
    }

    /// Column count visible to the outside: internal-id columns excluded.
    pub fn visible_field_len(&self) -> usize {
        if self.select_fields.is_empty() {
            self.header.iter().filter(|f| !f.is_internal_id()).count()
        } else {
            self.select_fields.len()
        }
    }

    /// Read back the internal id of `record` for the view block `view_name`.
    pub fn internal_record_id(&self, view_name: &str, record_index: usize) -> Result<i64> {
        let idx = self
            .header
            .iter()
            .position(|f| f.is_internal_id() && f.view.eq_ignore_ascii_case(view_name))
            .ok_or_else(|| {
                Error::unplaced(ErrorKind::TableNotLoaded(view_name.to_string()))
            })?;
        match self.record_set[record_index][idx].value() {
            Value::Integer(id) => Ok(*id),
            _ => Err(Error::unplaced(ErrorKind::TableNotLoaded(view_name.to_string()))),
        }
    }

    /// Prepend an internal-id column numbering records in order. Used for
    /// DML loads that must track identity through joins and filters.
    pub fn materialize_internal_ids(&mut self) {
        let view_name = self
            .header
            .first()
            .map(|f| f.view.clone())
            .unwrap_or_default();
        let mut fields = vec![HeaderField {
            view: view_name,
            column: INTERNAL_ID_COLUMN.to_string(),
            ..HeaderField::default()
        }];
        fields.extend(self.header.0.clone());
        self.header = Header(fields);
        for (i, record) in self.record_set.iter_mut().enumerate() {
            record.insert(0, Cell::Single(Value::Integer(i as i64)));
        }
        self.use_internal_id = true;
    }

    fn effective_select_fields(&self) -> Vec<usize> {
        if self.select_fields.is_empty() {
            self.header
                .iter()
                .enumerate()
                .filter(|(_, f)| !f.is_internal_id())
                .map(|(i, _)| i)
                .collect()
        } else {
            self.select_fields.clone()
        }
    }

    /// Project to the select list, strip internal ids and group structure,
    /// and clear caches. Idempotent.
    pub fn fix(&mut self) {
        let select = self.effective_select_fields();

        let mut fields = Vec::with_capacity(select.len());
        for (i, idx) in select.iter().enumerate() {
            let source = &self.header[*idx];
            fields.push(HeaderField {
                view: String::new(),
                column: source.output_name().to_string(),
                number: i + 1,
                is_from_table: true,
                ..HeaderField::default()
            });
        }

        let record_set = self
            .record_set
            .iter()
            .map(|record| {
                select
                    .iter()
                    .map(|idx| Cell::Single(record[*idx].value().clone()))
                    .collect()
            })
            .collect();

        self.header = Header(fields);
        self.record_set = record_set;
        self.is_grouped = false;
        self.use_internal_id = false;
        self.select_fields = Vec::new();
        self.sort_values = None;
    }

    fn check_set_operand(&self, other: &View) -> Result<()> {
        if self.field_len() != other.field_len() {
            return Err(Error::unplaced(ErrorKind::CombinedFieldLength(self.field_len())));
        }
        Ok(())
    }

    fn fingerprint(record: &Record) -> String {
        let values: Vec<Value> = record.iter().map(|cell| cell.value().clone()).collect();
        identity_key(&values)
    }

    pub fn union(&mut self, other: View, all: bool) -> Result<()> {
        self.check_set_operand(&other)?;
        self.record_set.extend(other.record_set);
        if !all {
            self.dedup_records();
        }
        Ok(())
    }

    pub fn except(&mut self, other: View, all: bool) -> Result<()> {
        self.check_set_operand(&other)?;
        let mut bag: FxHashMap<String, usize> = FxHashMap::default();
        for record in &other.record_set {
            *bag.entry(Self::fingerprint(record)).or_insert(0) += 1;
        }
        if all {
            let mut kept = Vec::with_capacity(self.record_set.len());
            for record in std::mem::take(&mut self.record_set) {
                let key = Self::fingerprint(&record);
                match bag.get_mut(&key) {
                    Some(count) if *count > 0 => *count -= 1,
                    _ => kept.push(record),
                }
            }
            self.record_set = kept;
        } else {
            self.dedup_records();
            self.record_set
                .retain(|record| !bag.contains_key(&Self::fingerprint(record)));
        }
        Ok(())
    }

    pub fn intersect(&mut self, other: View, all: bool) -> Result<()> {
        self.check_set_operand(&other)?;
        let mut bag: FxHashMap<String, usize> = FxHashMap::default();
        for record in &other.record_set {
            *bag.entry(Self::fingerprint(record)).or_insert(0) += 1;
        }
        if all {
            let mut kept = Vec::with_capacity(self.record_set.len());
            for record in std::mem::take(&mut self.record_set) {
                let key = Self::fingerprint(&record);
                if let Some(count) = bag.get_mut(&key) {
                    if *count > 0 {
                        *count -= 1;
                        kept.push(record);
                    }
                }
            }
            self.record_set = kept;
        } else {
            self.dedup_records();
            self.record_set
                .retain(|record| bag.contains_key(&Self::fingerprint(record)));
        }
        Ok(())
    }

    /// Expand one grouped record back into a flat view: one record per
    /// group member, in original row order. Aggregate arguments are
    /// evaluated against this expansion.
    pub fn from_grouped_record(&self, record_index: usize) -> View {
        let record = &self.record_set[record_index];
        let multiplicity = record.iter().map(Cell::len).max().unwrap_or(0);
        let record_set = (0..multiplicity)
            .map(|member| {
                record
                    .iter()
                    .map(|cell| {
                        let values = cell.group_values();
                        Cell::Single(values.get(member).cloned().unwrap_or(Value::Null))
                    })
                    .collect()
            })
            .collect();
        View {
            header: self.header.clone(),
            record_set,
            ..View::default()
        }
    }

    /// Deduplicate records preserving first-occurrence order.
    pub fn dedup_records(&mut self) {
        let mut seen: FxHashMap<String, ()> = FxHashMap::default();
        self.record_set.retain(|record| {
            let key = Self::fingerprint(record);
            seen.insert(key, ()).is_none()
        });
    }
}

//! Parsing aggregate specs such as `name,hits=count(),max(score)`.
//!
//! ```text
//! spec   := column (',' column)*
//! column := (outname '=')? (colname | function '(' colname? ')')
//! ```
//!
//! A bare `colname` stands for `str(colname)`. Spaces are ignored. Without an
//! explicit `outname`, a column is named after its input column when bare and
//! after its full `function(colname)` text otherwise.

use crate::aggregators::Aggregator;
use crate::error::AggregError;
use std::fmt;
use std::str::FromStr;

/// One output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregColumn {
    /// Header of the column in the output.
    pub outname: String,
    /// Input column it reads; empty for columns such as `count()`.
    pub colname: String,
    pub aggregator: Aggregator,
}

impl AggregColumn {
    /// Whether the column reads an input column.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.colname.is_empty()
    }
}

/// Parsed list of output columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregSpec {
    columns: Vec<AggregColumn>,
}

impl AggregSpec {
    /// Parse a spec string.
    ///
    /// ```
    /// use ironcsv::aggregators::Aggregator;
    /// use ironcsv::engine::AggregSpec;
    ///
    /// let spec = AggregSpec::parse("name, top=top20(tag), max(score)")?;
    /// let names: Vec<_> = spec.columns().iter().map(|c| c.outname.as_str()).collect();
    /// assert_eq!(names, ["name", "top", "max(score)"]);
    /// assert_eq!(spec.columns()[1].aggregator, Aggregator::Top20);
    /// # Ok::<(), ironcsv::error::AggregError>(())
    /// ```
    ///
    /// # Errors
    /// - [`AggregError::UnknownFunction`] for a function name not in the built-in table
    /// - [`AggregError::SpecSyntax`] for unbalanced or nested parentheses, a
    ///   dangling `name=`, or a group-by function without a column
    /// - [`AggregError::EmptySpec`] when no column is defined
    pub fn parse(spec: &str) -> Result<Self, AggregError> {
        let mut columns = Vec::new();
        let mut outname: Option<String> = None;
        let mut func: Option<(String, Aggregator)> = None;
        let mut tmp = String::new();
        let mut depth = 0u32;

        for c in spec.chars() {
            match c {
                '=' if depth == 0 => outname = Some(std::mem::take(&mut tmp)),
                '(' => {
                    depth += 1;
                    if depth > 1 {
                        return Err(AggregError::SpecSyntax(format!(
                            "nested parenthesis in {spec:?}"
                        )));
                    }
                    let name = std::mem::take(&mut tmp);
                    let aggregator = Aggregator::from_name(&name)
                        .ok_or_else(|| AggregError::UnknownFunction(name.clone()))?;
                    func = Some((name, aggregator));
                }
                ')' => {
                    let Some((name, aggregator)) = func.take() else {
                        return Err(AggregError::SpecSyntax(format!(
                            "unexpected ')' in {spec:?}"
                        )));
                    };
                    depth -= 1;
                    let colname = std::mem::take(&mut tmp);
                    if aggregator.is_key() && colname.is_empty() {
                        return Err(AggregError::SpecSyntax(format!(
                            "{name}() needs an input column"
                        )));
                    }
                    let outname = outname
                        .take()
                        .filter(|o| !o.is_empty())
                        .unwrap_or_else(|| format!("{name}({colname})"));
                    columns.push(AggregColumn {
                        outname,
                        colname,
                        aggregator,
                    });
                }
                ',' if depth == 0 => {
                    if !tmp.is_empty() {
                        columns.push(bare(outname.take(), std::mem::take(&mut tmp)));
                    }
                }
                ' ' => {}
                _ => tmp.push(c),
            }
        }

        if depth != 0 {
            return Err(AggregError::SpecSyntax(format!(
                "missing parenthesis in {spec:?}"
            )));
        }
        if !tmp.is_empty() {
            columns.push(bare(outname.take(), tmp));
        }
        if let Some(name) = outname {
            return Err(AggregError::SpecSyntax(format!(
                "output name {name:?} is not followed by a column"
            )));
        }
        if columns.is_empty() {
            return Err(AggregError::EmptySpec);
        }
        Ok(Self { columns })
    }

    #[must_use]
    pub fn columns(&self) -> &[AggregColumn] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Output header, in column order.
    pub fn outnames(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.outname.as_str())
    }
}

fn bare(outname: Option<String>, colname: String) -> AggregColumn {
    AggregColumn {
        outname: outname
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| colname.clone()),
        colname,
        aggregator: Aggregator::Str,
    }
}

impl FromStr for AggregSpec {
    type Err = AggregError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AggregSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let call = format!("{}({})", c.aggregator, c.colname);
            if c.aggregator == Aggregator::Str && c.outname == c.colname {
                f.write_str(&c.colname)?;
            } else if c.outname == call {
                f.write_str(&call)?;
            } else {
                write!(f, "{}={call}", c.outname)?;
            }
        }
        Ok(())
    }
}

use super::{PyExpr, Rule};
use pest::iterators::Pair;

/// Build an expression from any expression-level pair. Constructs outside the
/// modelled subset become [`PyExpr::Opaque`] carrying their source text.
pub(super) fn build_expression(pair: Pair<Rule>) -> PyExpr {
    match pair.as_rule() {
        Rule::expression => match pair.clone().into_inner().next() {
            Some(inner) => build_expression(inner),
            None => opaque(&pair),
        },
        Rule::lambda_expr => opaque(&pair),
        Rule::conditional => {
            let mut inner = pair.clone().into_inner();
            match (inner.next(), inner.next()) {
                (Some(chain), None) => build_expression(chain),
                _ => opaque(&pair),
            }
        }
        Rule::operand_chain => {
            let mut inner = pair.clone().into_inner();
            match (inner.next(), inner.next()) {
                (Some(unary), None) => build_expression(unary),
                _ => opaque(&pair),
            }
        }
        Rule::unary => build_unary(pair),
        Rule::power => build_power(pair),
        Rule::star_expr => match pair.clone().into_inner().next() {
            Some(inner) => PyExpr::Starred(Box::new(build_expression(inner))),
            None => opaque(&pair),
        },
        Rule::expression_list | Rule::tuple_items => build_sequence(pair),
        _ => build_primary(pair),
    }
}

fn build_unary(pair: Pair<Rule>) -> PyExpr {
    let mut prefixes = Vec::new();
    let mut operand = None;
    for p in pair.clone().into_inner() {
        match p.as_rule() {
            Rule::prefix_op => prefixes.push(p.as_str().trim().to_string()),
            _ => operand = Some(build_expression(p)),
        }
    }
    match (prefixes.as_slice(), operand) {
        ([], Some(expr)) => expr,
        ([op], Some(PyExpr::Int(n))) if op == "-" => PyExpr::Int(-n),
        ([op], Some(PyExpr::Float(f))) if op == "-" => PyExpr::Float(-f),
        ([op], Some(expr @ (PyExpr::Int(_) | PyExpr::Float(_)))) if op == "+" => expr,
        _ => opaque(&pair),
    }
}

fn build_power(pair: Pair<Rule>) -> PyExpr {
    let mut inner = pair.clone().into_inner();
    let mut expr = match inner.next() {
        Some(primary) => build_primary(primary),
        None => return opaque(&pair),
    };
    for trailer in inner {
        expr = match trailer.as_rule() {
            Rule::attribute => {
                let attr = trailer
                    .into_inner()
                    .next()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                PyExpr::Attribute {
                    value: Box::new(expr),
                    attr,
                }
            }
            Rule::call_args => build_call(expr, trailer),
            Rule::subscript => {
                let items: Vec<PyExpr> = trailer
                    .into_inner()
                    .map(|item| match item.clone().into_inner().next() {
                        Some(inner) if inner.as_rule() == Rule::expression => {
                            build_expression(inner)
                        }
                        _ => opaque(&item),
                    })
                    .collect();
                let index = if items.len() == 1 {
                    items.into_iter().next().unwrap_or(PyExpr::None)
                } else {
                    PyExpr::Tuple(items)
                };
                PyExpr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                }
            }
            _ => return opaque(&pair),
        };
    }
    expr
}

fn build_call(func: PyExpr, args_pair: Pair<Rule>) -> PyExpr {
    let mut args = Vec::new();
    let mut keywords = Vec::new();
    for argument in args_pair.into_inner() {
        let Some(arg) = argument.clone().into_inner().next() else {
            continue;
        };
        match arg.as_rule() {
            Rule::keyword_arg => {
                let mut parts = arg.into_inner();
                if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
                    keywords.push((name.as_str().to_string(), build_expression(value)));
                }
            }
            Rule::star_arg => match arg.clone().into_inner().next() {
                Some(inner) => args.push(PyExpr::Starred(Box::new(build_expression(inner)))),
                None => args.push(opaque(&arg)),
            },
            Rule::double_star_arg | Rule::generator_arg => args.push(opaque(&arg)),
            _ => args.push(build_expression(arg)),
        }
    }
    PyExpr::Call {
        func: Box::new(func),
        args,
        keywords,
    }
}

/// `a, b` / `(a, b)` / `(a,)` are tuples; `(a)` is just `a`.
fn build_sequence(pair: Pair<Rule>) -> PyExpr {
    let mut items = Vec::new();
    let mut trailing = false;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::trailing_comma => trailing = true,
            _ => items.push(build_expression(p)),
        }
    }
    if items.len() == 1 && !trailing {
        items.into_iter().next().unwrap_or(PyExpr::None)
    } else {
        PyExpr::Tuple(items)
    }
}

fn build_items(pair: Pair<Rule>) -> Vec<PyExpr> {
    pair.into_inner().map(build_expression).collect()
}

fn build_primary(pair: Pair<Rule>) -> PyExpr {
    match pair.as_rule() {
        Rule::identifier => PyExpr::Name(pair.as_str().to_string()),
        Rule::none_lit => PyExpr::None,
        Rule::true_lit => PyExpr::Bool(true),
        Rule::false_lit => PyExpr::Bool(false),
        Rule::ellipsis => opaque(&pair),
        Rule::string => build_string(pair),
        Rule::int_number => parse_int(pair.as_str()).map(PyExpr::Int).unwrap_or_else(|| opaque(&pair)),
        Rule::float_number => {
            let text = pair.as_str().replace('_', "");
            if text.ends_with(['j', 'J']) {
                return opaque(&pair);
            }
            text.parse::<f64>()
                .map(PyExpr::Float)
                .unwrap_or_else(|_| opaque(&pair))
        }
        Rule::paren_expr => match pair.clone().into_inner().next() {
            None => PyExpr::Tuple(Vec::new()),
            Some(inner) if inner.as_rule() == Rule::tuple_items => build_sequence(inner),
            Some(_) => opaque(&pair),
        },
        Rule::list_display => match pair.clone().into_inner().next() {
            None => PyExpr::List(Vec::new()),
            Some(inner) if inner.as_rule() == Rule::list_items => PyExpr::List(build_items(inner)),
            Some(_) => opaque(&pair),
        },
        Rule::brace_display => match pair.clone().into_inner().next() {
            None => PyExpr::Dict(Vec::new()),
            Some(inner) => match inner.as_rule() {
                Rule::dict_items => PyExpr::Dict(build_dict_items(inner)),
                Rule::set_items => PyExpr::Set(build_items(inner)),
                _ => opaque(&pair),
            },
        },
        Rule::expression
        | Rule::conditional
        | Rule::operand_chain
        | Rule::unary
        | Rule::power
        | Rule::star_expr => build_expression(pair),
        _ => opaque(&pair),
    }
}

fn build_dict_items(pair: Pair<Rule>) -> Vec<(Option<PyExpr>, PyExpr)> {
    let mut entries = Vec::new();
    for item in pair.into_inner() {
        let Some(entry) = item.into_inner().next() else {
            continue;
        };
        match entry.as_rule() {
            Rule::dict_pair => {
                let mut kv = entry.into_inner();
                if let (Some(k), Some(v)) = (kv.next(), kv.next()) {
                    entries.push((Some(build_expression(k)), build_expression(v)));
                }
            }
            Rule::dict_spread => {
                if let Some(inner) = entry.into_inner().next() {
                    entries.push((None, build_expression(inner)));
                }
            }
            _ => {}
        }
    }
    entries
}

fn build_string(pair: Pair<Rule>) -> PyExpr {
    let mut value = String::new();
    for part in pair.into_inner() {
        let mut prefix = String::new();
        let mut body = "";
        for p in part.into_inner() {
            match p.as_rule() {
                Rule::string_prefix => prefix = p.as_str().to_ascii_lowercase(),
                Rule::long_dq | Rule::long_sq => {
                    let s = p.as_str();
                    body = &s[3..s.len() - 3];
                }
                Rule::short_dq | Rule::short_sq => {
                    let s = p.as_str();
                    body = &s[1..s.len() - 1];
                }
                _ => {}
            }
        }
        if prefix.contains('r') {
            value.push_str(body);
        } else {
            value.push_str(&unescape(body));
        }
    }
    PyExpr::Str(value)
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_int(text: &str) -> Option<i64> {
    let clean = text.replace('_', "");
    let lower = clean.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

fn opaque(pair: &Pair<Rule>) -> PyExpr {
    PyExpr::Opaque(pair.as_str().trim().to_string())
}

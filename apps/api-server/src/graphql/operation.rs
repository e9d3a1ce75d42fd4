//! Just enough GraphQL document parsing to identify an operation.
//!
//! Extracts the operation type, its name and the names of the root
//! selections of the first operation definition. Everything below the
//! root selection set is skipped.

use std::fmt;

/// Root fields that only inspect the schema.
pub const INTROSPECTION_FIELDS: [&str; 3] = ["__schema", "__type", "__typename"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationType {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        })
    }
}

/// Identity of a GraphQL operation for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphQlOperation {
    pub operation_type: OperationType,
    pub name: Option<String>,
    /// Response keys' underlying field names at the root, in document order.
    pub root_fields: Vec<String>,
}

impl GraphQlOperation {
    /// Parse the first operation of a query document.
    ///
    /// Returns `None` when the document contains no operation.
    pub fn from_query(query: &str) -> Option<Self> {
        let tokens = tokenize(query);
        let mut cursor = 0;

        while cursor < tokens.len() {
            match &tokens[cursor] {
                Token::Punct('{') => {
                    return Some(Self {
                        root_fields: root_selections(&tokens, cursor),
                        ..Self::default()
                    });
                }
                Token::Name(keyword) if keyword == "fragment" => {
                    cursor = skip_definition(&tokens, cursor);
                }
                Token::Name(keyword) => {
                    let operation_type = match keyword.as_str() {
                        "query" => OperationType::Query,
                        "mutation" => OperationType::Mutation,
                        "subscription" => OperationType::Subscription,
                        _ => return None,
                    };

                    let mut i = cursor + 1;
                    let name = match tokens.get(i) {
                        Some(Token::Name(name)) => {
                            i += 1;
                            Some(name.clone())
                        }
                        _ => None,
                    };
                    if tokens.get(i) == Some(&Token::Punct('(')) {
                        i = skip_group(&tokens, i);
                    }
                    i = skip_directives(&tokens, i);
                    if tokens.get(i) != Some(&Token::Punct('{')) {
                        return None;
                    }

                    return Some(Self {
                        operation_type,
                        name,
                        root_fields: root_selections(&tokens, i),
                    });
                }
                _ => cursor += 1,
            }
        }

        None
    }

    /// The field counted against the limit: the first root field that is
    /// not introspection, else the first root field, else the operation name.
    pub fn field_name(&self) -> &str {
        self.root_fields
            .iter()
            .find(|field| !INTROSPECTION_FIELDS.contains(&field.as_str()))
            .or(self.root_fields.first())
            .or(self.name.as_ref())
            .map(String::as_str)
            .unwrap_or("anonymous")
    }

    /// Whether every root selection is an introspection field.
    pub fn is_introspection(&self) -> bool {
        !self.root_fields.is_empty()
            && self
                .root_fields
                .iter()
                .all(|field| INTROSPECTION_FIELDS.contains(&field.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Punct(char),
    Spread,
    Value,
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut escaped = false;
                for c in chars.by_ref() {
                    match c {
                        '\\' if !escaped => escaped = true,
                        '"' if !escaped => break,
                        _ => escaped = false,
                    }
                }
                tokens.push(Token::Value);
            }
            '.' => {
                if chars.next_if_eq(&'.').is_some() && chars.next_if_eq(&'.').is_some() {
                    tokens.push(Token::Spread);
                }
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '@' | '$' | '=' | '!' => {
                tokens.push(Token::Punct(c))
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::from(c);
                while let Some(next) = chars.next_if(|n| n.is_ascii_alphanumeric() || *n == '_') {
                    name.push(next);
                }
                tokens.push(Token::Name(name));
            }
            c if c.is_ascii_digit() || c == '-' => {
                while chars
                    .next_if(|n| n.is_ascii_alphanumeric() || matches!(*n, '.' | '+' | '-'))
                    .is_some()
                {}
                tokens.push(Token::Value);
            }
            _ => {}
        }
    }

    tokens
}

/// Index just past the bracket group opened at `open`.
fn skip_group(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct('{' | '(' | '[') => depth += 1,
            Token::Punct('}' | ')' | ']') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

fn skip_definition(tokens: &[Token], start: usize) -> usize {
    match tokens[start..].iter().position(|t| *t == Token::Punct('{')) {
        Some(offset) => skip_group(tokens, start + offset),
        None => tokens.len(),
    }
}

fn skip_directives(tokens: &[Token], mut i: usize) -> usize {
    while tokens.get(i) == Some(&Token::Punct('@')) {
        i += 2;
        if tokens.get(i) == Some(&Token::Punct('(')) {
            i = skip_group(tokens, i);
        }
    }
    i
}

/// Field names of the selection set opened at `open`.
fn root_selections(tokens: &[Token], open: usize) -> Vec<String> {
    let close = skip_group(tokens, open).saturating_sub(1);
    let mut fields = Vec::new();
    let mut i = open + 1;

    while i < close {
        match &tokens[i] {
            Token::Spread => {
                // Fragment spread or inline fragment, never a root field itself
                i += 1;
                match tokens.get(i) {
                    Some(Token::Name(name)) if name == "on" => i += 2,
                    Some(Token::Name(_)) => i += 1,
                    _ => {}
                }
                i = skip_directives(tokens, i);
                if tokens.get(i) == Some(&Token::Punct('{')) {
                    i = skip_group(tokens, i);
                }
            }
            Token::Name(name) => {
                let field = match (tokens.get(i + 1), tokens.get(i + 2)) {
                    (Some(Token::Punct(':')), Some(Token::Name(field))) => {
                        i += 2;
                        field.clone()
                    }
                    _ => name.clone(),
                };
                fields.push(field);

                i += 1;
                if tokens.get(i) == Some(&Token::Punct('(')) {
                    i = skip_group(tokens, i);
                }
                i = skip_directives(tokens, i);
                if tokens.get(i) == Some(&Token::Punct('{')) {
                    i = skip_group(tokens, i);
                }
            }
            _ => i += 1,
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_shorthand_query() {
        let op = GraphQlOperation::from_query("{ products { id name } }").unwrap();
        assert_eq!(op.operation_type, OperationType::Query);
        assert_eq!(op.name, None);
        assert_eq!(op.root_fields, vec!["products"]);
        assert_eq!(op.field_name(), "products");
    }

    #[test]
    fn test_named_mutation_with_variables_and_alias() {
        let op = GraphQlOperation::from_query(
            r#"
            # checkout flow
            mutation Checkout($cart: ID!, $note: String = "a } tricky { note") {
              order: createOrder(cartId: $cart, note: $note) @include(if: true) {
                id
                total
              }
              clearCart(id: $cart)
            }
            "#,
        )
        .unwrap();

        assert_eq!(op.operation_type, OperationType::Mutation);
        assert_eq!(op.name.as_deref(), Some("Checkout"));
        assert_eq!(op.root_fields, vec!["createOrder", "clearCart"]);
        assert_eq!(op.operation_type.to_string(), "mutation");
    }

    #[test]
    fn test_fragments_are_skipped() {
        let op = GraphQlOperation::from_query(
            r#"
            fragment ProductFields on Product { id name price }
            query Feed {
              ...Extra
              ... on Query { trending { id } }
              feed(first: 10, after: "abc") { ...ProductFields }
            }
            "#,
        )
        .unwrap();

        assert_eq!(op.name.as_deref(), Some("Feed"));
        assert_eq!(op.root_fields, vec!["feed"]);
    }

    #[test]
    fn test_introspection_detection() {
        let op = GraphQlOperation::from_query(
            "query IntrospectionQuery { __schema { types { name } } }",
        )
        .unwrap();
        assert!(op.is_introspection());

        let op = GraphQlOperation::from_query("{ __typename __type(name: \"User\") { name } }")
            .unwrap();
        assert!(op.is_introspection());

        let op = GraphQlOperation::from_query("{ __schema { types { name } } me { id } }").unwrap();
        assert!(!op.is_introspection());
        assert_eq!(op.field_name(), "me");
    }

    #[test]
    fn test_field_name_skips_leading_introspection() {
        let op = GraphQlOperation::from_query(
            "query Orders { __typename __type(name: \"Order\") { name } orders { id } me { id } }",
        )
        .unwrap();
        assert_eq!(op.field_name(), "orders");

        let op = GraphQlOperation::from_query("mutation Checkout { __typename placeOrder(id: 1) { id } }")
            .unwrap();
        assert_eq!(op.field_name(), "placeOrder");
    }

    #[test]
    fn test_not_an_operation() {
        assert_eq!(GraphQlOperation::from_query(""), None);
        assert_eq!(GraphQlOperation::from_query("fragment F on User { id }"), None);
    }
}

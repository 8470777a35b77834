//! This module implements macros for an intuitive and condensed construction of expressions,
//! mainly intended for writing tests.
//! [variable!] creates a Variable, [bitvec!] creates a Bitvector and [expr!] creates an Expression.

/// Creates a `Variable` specified by the string slice of form `name:size`.
///
/// `size` determines the size in bytes.
///
/// ## Example
/// ```rust
///     use pathmem_lib::expr::*;
///     use pathmem_lib::variable;
///
///     assert_eq!(variable!("x:8"), Variable{ name: "x".into(), size: ByteSize::new(8) });
/// ```
#[macro_export]
macro_rules! variable {
    (  $x:expr  ) => {
        parsing::parse_variable($x)
    };
}

/// Creates a `Bitvector` specified by the string slice of form `0xvalue:size` or `value:size`.
///
/// `value` is either in hexadecimal representation with leading `0x` or in
/// decimal representation. `size` is in bytes.
/// If `value` does not fit in `size`, `value` is truncated.
/// ## Panics
///- string must contain `:`
///- `size` must be one of `1`, `2`, `4` or `8`
///
/// ## Example
/// ```rust
///     use pathmem_lib::expr::*;
///     use pathmem_lib::bitvec;
///
///     assert_eq!(bitvec!("0xFF:4"), Bitvector::from_u32(0xFF));
///     assert_eq!(bitvec!("0x-A:8"), Bitvector::from_i64(-10));
///     assert_eq!(bitvec!("-5:1"), Bitvector::from_i8(-5));
/// ```
#[macro_export]
macro_rules! bitvec {
    (  $x:expr  ) => {
        parsing::parse_bitvec($x)
    };
}

/// Creates an `Expression` specified by the string slice.
///
/// Currently supported are: `Var` and `Const` as well as `IntAdd` and `IntSub` of `BinOp`.
/// Supported unary operations are `Int2Comp` and `BoolNegate`.
/// Does not support `(`, `)` nor chaining of `+`.
/// ## Panics
///- utilizes `variable!` and `bitvec!` macros and their constraints.
///
/// ## Example
/// ```rust
///     use pathmem_lib::expr::*;
///     use pathmem_lib::expr;
///
///     assert_eq!(expr!("0xFF:4"), Expression::Const(Bitvector::from_u32(0xFF)));
///     assert_eq!(
///         expr!("x:8"),
///         Expression::Var(Variable { name: "x".into(), size: ByteSize::new(8) })
///     );
///     assert_eq!(
///         expr!("x:8 + 0x42:8"),
///         Expression::BinOp { op: BinOpType::IntAdd,
///             lhs: Box::new(Expression::Var(Variable { name: "x".into(), size: ByteSize::new(8) })),
///             rhs: Box::new(Expression::Const(Bitvector::from_u64(0x42)))}
///     );
/// ```
#[macro_export]
macro_rules! expr {
    (  $x:expr  ) => {
        parsing::parse_expr($x)
    };
}

pub mod parsing {
    //! Provides parsing functions for the macros defined in `macros.rs`.
    //! This module hides the parsing functions and allows exposure of the macros only.
    use crate::expr::{BinOpType, Bitvector, ByteSize, Expression, UnOpType, Variable};
    use regex::RegexSet;

    /// Parses a Variable defining string slice and returns its corresponding Variable.
    ///
    /// This is used for the `variable!` macro, consider the macro documentation for more details.
    pub fn parse_variable<S: AsRef<str>>(str: S) -> Variable {
        let args: Vec<&str> = str.as_ref().split(':').collect();
        if args.len() != 2 {
            panic!("Could not uniquely parse variable: {}", str.as_ref())
        }

        let (name, size) = (args[0], args[1]);
        Variable {
            name: name.to_string(),
            size: ByteSize::new(size.parse().unwrap()),
        }
    }

    /// Parses a Bitvector defining string slice and returns its corresponding Bitvector.
    ///
    /// This is used for the `bitvec!` macro, consider the macro documentation for more details.
    pub fn parse_bitvec<S: AsRef<str>>(str: S) -> Bitvector {
        let args: Vec<&str> = str.as_ref().split(&['x', ':'][..]).collect();
        let value: i128;
        if args.len() == 3 {
            // hex representation
            value = i128::from_str_radix(args[1], 16).unwrap();
        } else if args.len() == 2 {
            // dec representation
            value = args[0].parse().unwrap();
        } else {
            panic!("Could not uniquely parse bitvector: {}", str.as_ref())
        }
        Bitvector::from_i128(value)
            .into_sign_resize(args[args.len() - 1].parse::<usize>().unwrap() * 8)
    }

    /// Parses an Expression defining string slice and returns its corresponding Expression.
    ///
    /// This is used for the `expr!` macro, consider the macro documentation for more details.
    /// Variable names must not start with a number.
    pub fn parse_expr<S: AsRef<str>>(str: S) -> Expression {
        let set = RegexSet::new([
            r"^[[:alnum:]&&[^0-9]]{1}[[:alnum:]&&[^x]]?[[:alnum:]_]*:[0-9]{1,2}$", // Variable
            r"^((0x(-)?[[:alnum:]]+)|^(-)?([0-9])+)+:[0-9]+$",                     // Constant
            r"^[^\+]*\+{1}[^\+]*$",                                                // BinOp (IntAdd)
            r"^[[:ascii:]]+ \-{1} [[:ascii:]]+$",                                  // BinOp (IntSub)
            r"^-\([[:ascii:]]*\)$", // UnOp (Int2Comp)
            r"^¬\([[:ascii:]]*\)$", // UnOp (BoolNegate)
        ])
        .unwrap();
        let result: Vec<usize> = set.matches(str.as_ref()).into_iter().collect();
        if result.len() != 1 {
            panic!("Expression: {} matched Regex: {:#?}", str.as_ref(), result)
        }

        match result[0] {
            0 => Expression::Var(parse_variable(str)),
            1 => Expression::Const(parse_bitvec(str)),
            2 => {
                let args: Vec<&str> = str.as_ref().split('+').collect();
                Expression::BinOp {
                    op: BinOpType::IntAdd,
                    lhs: Box::new(parse_expr(args[0].trim())),
                    rhs: Box::new(parse_expr(args[1].trim())),
                }
            }
            3 => {
                let args: Vec<&str> = str.as_ref().split('-').collect();
                Expression::BinOp {
                    op: BinOpType::IntSub,
                    lhs: Box::new(parse_expr(args[0].trim())),
                    rhs: Box::new(parse_expr(args[1].trim())),
                }
            }
            4 => {
                let arg: &str = str.as_ref().trim_matches(&['-', '(', ')'][..]);
                Expression::UnOp {
                    op: UnOpType::Int2Comp,
                    arg: Box::new(parse_expr(arg.trim())),
                }
            }
            5 => {
                let arg: &str = str.as_ref().trim_matches(&['¬', '(', ')'][..]);
                Expression::UnOp {
                    op: UnOpType::BoolNegate,
                    arg: Box::new(parse_expr(arg.trim())),
                }
            }
            _ => panic!(),
        }
    }
}

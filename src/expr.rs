//! 权重表达式：编译并对整条要素记录求值。
//!
//! 表达式使用SQL语法（`sqlparser`的通用方言）解析，然后编译为只引用属性索引的
//! [WeightExpr]树，逐条记录求值时不再查找名称。
//!
//! 支持的语法：
//! - 属性引用（可加双引号）、数字/字符串/布尔/`NULL`字面量
//! - `+ - * / %`、比较运算、`AND`/`OR`/`NOT`、一元负号
//! - `CASE [x] WHEN ... THEN ... [ELSE ...] END`、`CAST(x AS ...)`、`IS [NOT] NULL`
//! - 函数 `abs sqrt ln log10 exp pow/power floor ceil round least greatest coalesce`
//!
//! 空值按SQL语义传播；除以零得到空值。
use sqlparser::{
    ast::{
        BinaryOperator as SqlBinaryOp, Expr as SqlExpr, FunctionArg, FunctionArgExpr,
        FunctionArguments, ObjectName, UnaryOperator, Value,
    },
    dialect::GenericDialect,
    parser::Parser,
    tokenizer::Token,
};

use crate::{
    feature::{AttributeValue, Feature, Schema},
    DensityError, Result,
};

/// 求值过程中的标量
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Num(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    fn to_num(&self) -> Option<f64> {
        match self {
            Scalar::Num(v) => Some(*v),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(text) => text.trim().parse().ok(),
            Scalar::Null => None,
        }
    }

    fn to_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Num(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    fn from_attribute(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Int(v) => Scalar::Num(*v as f64),
            AttributeValue::Float(v) => Scalar::Num(*v),
            AttributeValue::Bool(b) => Scalar::Bool(*b),
            AttributeValue::Text(text) => Scalar::Text(text.clone()),
            AttributeValue::Null | AttributeValue::Geometry(_) => Scalar::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sqrt,
    Ln,
    Log10,
    Exp,
    Pow,
    Floor,
    Ceil,
    Round,
    Least,
    Greatest,
    Coalesce,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "abs" => Function::Abs,
            "sqrt" => Function::Sqrt,
            "ln" => Function::Ln,
            "log10" => Function::Log10,
            "exp" => Function::Exp,
            "pow" | "power" => Function::Pow,
            "floor" => Function::Floor,
            "ceil" | "ceiling" => Function::Ceil,
            "round" => Function::Round,
            "least" => Function::Least,
            "greatest" => Function::Greatest,
            "coalesce" => Function::Coalesce,
            _ => return None,
        })
    }

    /// 参数个数范围
    fn arity(self) -> (usize, usize) {
        match self {
            Function::Pow => (2, 2),
            Function::Least | Function::Greatest | Function::Coalesce => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// 已编译的权重表达式
#[derive(Debug, Clone, PartialEq)]
pub enum WeightExpr {
    /// 按索引引用的属性
    Column(usize),
    Literal(Scalar),
    Negate(Box<WeightExpr>),
    Not(Box<WeightExpr>),
    Binary {
        left: Box<WeightExpr>,
        op: BinaryOp,
        right: Box<WeightExpr>,
    },
    IsNull {
        expr: Box<WeightExpr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<WeightExpr>>,
        branches: Vec<(WeightExpr, WeightExpr)>,
        otherwise: Option<Box<WeightExpr>>,
    },
    /// 数值转换
    Cast(Box<WeightExpr>),
    Call {
        func: Function,
        args: Vec<WeightExpr>,
    },
}

impl WeightExpr {
    /// 解析表达式文本并针对`schema`解析属性名
    ///
    /// # 错误
    /// 语法错误、不支持的结构返回[DensityError::Expression]；
    /// 引用不存在的属性返回[DensityError::UnknownAttribute]
    pub fn compile(text: &str, schema: &Schema) -> Result<Self> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(text)
            .map_err(|e| DensityError::Expression(e.to_string()))?;
        let parsed = parser
            .parse_expr()
            .map_err(|e| DensityError::Expression(e.to_string()))?;
        if parser.peek_token().token != Token::EOF {
            return Err(DensityError::Expression(format!(
                "表达式`{text}`之后存在多余的内容"
            )));
        }
        compile_sql(&parsed, schema)
    }

    /// 对记录求值并转换为浮点数；空值或无法转换的结果返回`None`
    pub fn evaluate(&self, feature: &Feature) -> Option<f64> {
        self.eval(feature).to_num()
    }

    /// 求值为标量
    pub fn eval(&self, feature: &Feature) -> Scalar {
        match self {
            WeightExpr::Column(index) => Scalar::from_attribute(feature.attribute(*index)),
            WeightExpr::Literal(value) => value.clone(),
            WeightExpr::Negate(inner) => match inner.eval(feature).to_num() {
                Some(v) => Scalar::Num(-v),
                None => Scalar::Null,
            },
            WeightExpr::Not(inner) => match inner.eval(feature).to_bool() {
                Some(b) => Scalar::Bool(!b),
                None => Scalar::Null,
            },
            WeightExpr::Binary { left, op, right } => {
                eval_binary(*op, left.eval(feature), || right.eval(feature))
            }
            WeightExpr::IsNull { expr, negated } => {
                Scalar::Bool((expr.eval(feature) == Scalar::Null) != *negated)
            }
            WeightExpr::Case {
                operand,
                branches,
                otherwise,
            } => {
                let operand = operand.as_ref().map(|o| o.eval(feature));
                for (condition, result) in branches {
                    let matched = match &operand {
                        Some(value) => {
                            compare(BinaryOp::Eq, value, &condition.eval(feature))
                                == Scalar::Bool(true)
                        }
                        None => condition.eval(feature).to_bool() == Some(true),
                    };
                    if matched {
                        return result.eval(feature);
                    }
                }
                otherwise
                    .as_ref()
                    .map(|e| e.eval(feature))
                    .unwrap_or(Scalar::Null)
            }
            WeightExpr::Cast(inner) => inner
                .eval(feature)
                .to_num()
                .map(Scalar::Num)
                .unwrap_or(Scalar::Null),
            WeightExpr::Call { func, args } => call(*func, args, feature),
        }
    }
}

fn eval_binary(op: BinaryOp, left: Scalar, right: impl FnOnce() -> Scalar) -> Scalar {
    match op {
        BinaryOp::And => match left.to_bool() {
            Some(false) => Scalar::Bool(false),
            l => match (l, right().to_bool()) {
                (_, Some(false)) => Scalar::Bool(false),
                (Some(true), Some(true)) => Scalar::Bool(true),
                _ => Scalar::Null,
            },
        },
        BinaryOp::Or => match left.to_bool() {
            Some(true) => Scalar::Bool(true),
            l => match (l, right().to_bool()) {
                (_, Some(true)) => Scalar::Bool(true),
                (Some(false), Some(false)) => Scalar::Bool(false),
                _ => Scalar::Null,
            },
        },
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => compare(op, &left, &right()),
        _ => {
            let (Some(l), Some(r)) = (left.to_num(), right().to_num()) else {
                return Scalar::Null;
            };
            let v = match op {
                BinaryOp::Plus => l + r,
                BinaryOp::Minus => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide if r == 0.0 => return Scalar::Null,
                BinaryOp::Divide => l / r,
                BinaryOp::Modulo if r == 0.0 => return Scalar::Null,
                BinaryOp::Modulo => l % r,
                _ => unreachable!("逻辑与比较运算已在上面处理"),
            };
            Scalar::Num(v)
        }
    }
}

fn compare(op: BinaryOp, left: &Scalar, right: &Scalar) -> Scalar {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Scalar::Null, _) | (_, Scalar::Null) => return Scalar::Null,
        (Scalar::Text(l), Scalar::Text(r)) => Some(l.cmp(r)),
        (Scalar::Bool(l), Scalar::Bool(r)) => Some(l.cmp(r)),
        (l, r) => match (l.to_num(), r.to_num()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return Scalar::Null;
    };
    Scalar::Bool(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => return Scalar::Null,
    })
}

fn call(func: Function, args: &[WeightExpr], feature: &Feature) -> Scalar {
    let mut values = args.iter().map(|arg| arg.eval(feature));
    match func {
        Function::Coalesce => values.find(|v| *v != Scalar::Null).unwrap_or(Scalar::Null),
        Function::Least | Function::Greatest => {
            let nums = values.filter_map(|v| v.to_num());
            let folded = if func == Function::Least {
                nums.reduce(f64::min)
            } else {
                nums.reduce(f64::max)
            };
            folded.map(Scalar::Num).unwrap_or(Scalar::Null)
        }
        Function::Pow => {
            let base = values.next().and_then(|v| v.to_num());
            let exponent = values.next().and_then(|v| v.to_num());
            match (base, exponent) {
                (Some(b), Some(e)) => Scalar::Num(b.powf(e)),
                _ => Scalar::Null,
            }
        }
        unary => {
            let Some(v) = values.next().and_then(|v| v.to_num()) else {
                return Scalar::Null;
            };
            Scalar::Num(match unary {
                Function::Abs => v.abs(),
                Function::Sqrt => v.sqrt(),
                Function::Ln => v.ln(),
                Function::Log10 => v.log10(),
                Function::Exp => v.exp(),
                Function::Floor => v.floor(),
                Function::Ceil => v.ceil(),
                Function::Round => v.round(),
                _ => unreachable!("多参数函数已在上面处理"),
            })
        }
    }
}

fn compile_sql(e: &SqlExpr, schema: &Schema) -> Result<WeightExpr> {
    let compile = |inner: &SqlExpr| boxed(inner, schema);
    match e {
        SqlExpr::Identifier(id) => column(&id.value, schema),
        SqlExpr::CompoundIdentifier(parts) => {
            let name = parts
                .iter()
                .map(|i| i.value.as_str())
                .collect::<Vec<_>>()
                .join(".");
            column(&name, schema)
        }
        SqlExpr::Value(v) => literal(v).map(WeightExpr::Literal),
        SqlExpr::Nested(inner) => compile_sql(inner, schema),
        SqlExpr::UnaryOp { op, expr } => match op {
            UnaryOperator::Minus => Ok(WeightExpr::Negate(boxed(expr, schema)?)),
            UnaryOperator::Plus => compile_sql(expr, schema),
            UnaryOperator::Not => Ok(WeightExpr::Not(boxed(expr, schema)?)),
            _ => Err(DensityError::Expression(format!("不支持的一元运算符: {op}"))),
        },
        SqlExpr::BinaryOp { left, op, right } => Ok(WeightExpr::Binary {
            left: boxed(left, schema)?,
            op: binary_op(op)?,
            right: boxed(right, schema)?,
        }),
        SqlExpr::IsNull(inner) => Ok(WeightExpr::IsNull {
            expr: boxed(inner, schema)?,
            negated: false,
        }),
        SqlExpr::IsNotNull(inner) => Ok(WeightExpr::IsNull {
            expr: boxed(inner, schema)?,
            negated: true,
        }),
        SqlExpr::Cast { expr, .. } => Ok(WeightExpr::Cast(boxed(expr, schema)?)),
        SqlExpr::Case {
            operand,
            conditions,
            results,
            else_result,
            ..
        } => {
            let branches = conditions
                .iter()
                .zip(results)
                .map(|(c, r)| Ok((compile_sql(c, schema)?, compile_sql(r, schema)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(WeightExpr::Case {
                operand: operand.as_deref().map(compile).transpose()?,
                branches,
                otherwise: else_result.as_deref().map(compile).transpose()?,
            })
        }
        SqlExpr::Function(f) => {
            let name = object_name_to_string(&f.name);
            let func = Function::lookup(&name)
                .ok_or_else(|| DensityError::Expression(format!("未知函数: {name}")))?;
            let args = match &f.args {
                FunctionArguments::None => Vec::new(),
                FunctionArguments::List(list) => list
                    .args
                    .iter()
                    .map(|arg| function_arg(arg, schema))
                    .collect::<Result<Vec<_>>>()?,
                FunctionArguments::Subquery(_) => {
                    return Err(DensityError::Expression(format!(
                        "函数{name}不支持子查询参数"
                    )))
                }
            };
            let (min, max) = func.arity();
            if args.len() < min || args.len() > max {
                return Err(DensityError::Expression(format!(
                    "函数{name}的参数个数错误: {}",
                    args.len()
                )));
            }
            Ok(WeightExpr::Call { func, args })
        }
        _ => Err(DensityError::Expression(format!("不支持的表达式: {e}"))),
    }
}

fn boxed(e: &SqlExpr, schema: &Schema) -> Result<Box<WeightExpr>> {
    compile_sql(e, schema).map(Box::new)
}

fn column(name: &str, schema: &Schema) -> Result<WeightExpr> {
    schema
        .index_of(name)
        .map(WeightExpr::Column)
        .ok_or_else(|| DensityError::UnknownAttribute(name.to_string()))
}

fn literal(v: &Value) -> Result<Scalar> {
    match v {
        Value::Number(s, _) => s
            .parse()
            .map(Scalar::Num)
            .map_err(|_| DensityError::Expression(format!("无效数字: {s}"))),
        Value::SingleQuotedString(s) => Ok(Scalar::Text(s.clone())),
        Value::Boolean(b) => Ok(Scalar::Bool(*b)),
        Value::Null => Ok(Scalar::Null),
        _ => Err(DensityError::Expression(format!("不支持的字面量: {v}"))),
    }
}

fn function_arg(a: &FunctionArg, schema: &Schema) -> Result<WeightExpr> {
    match a {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => compile_sql(e, schema),
        _ => Err(DensityError::Expression(format!("不支持的函数参数: {a}"))),
    }
}

fn binary_op(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        SqlBinaryOp::Modulo => BinaryOp::Modulo,
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::And => BinaryOp::And,
        SqlBinaryOp::Or => BinaryOp::Or,
        _ => return Err(DensityError::Expression(format!("不支持的二元运算符: {op}"))),
    })
}

fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

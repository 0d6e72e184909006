// crates/am_physics/src/expr.rs

//! 输出表达式
//!
//! 支持 `+ - * /`、括号、一元负号、数字字面量、变量名与函数调用：
//!
//! | 函数 | 含义 |
//! |------|------|
//! | `exp`, `log`, `sqrt`, `abs` | 单参数数学函数 |
//! | `min`, `max` | 双参数 |
//! | `coxHazard(rr, pop, mort)` | 死亡数 = (rr − 1)·pop·mort / 100000 |
//! | `loglogRR(c)` | Nasari 等 (2016) 的对数-对数相对风险 |
//! | `hrRR(c)` | Krewski 等 (2009)，每 10 μg/m³ 风险比 1.06 |

use am_foundation::{AmError, AmResult};
use std::collections::BTreeSet;

/// 表达式语法树
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 数字
    Number(f64),
    /// 变量
    Var(String),
    /// 取负
    Neg(Box<Expr>),
    /// 二元运算
    Binary(Op, Box<Expr>, Box<Expr>),
    /// 函数调用
    Call(Func, Vec<Expr>),
}

/// 二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
}

/// 内置函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    /// e^x
    Exp,
    /// 自然对数
    Log,
    /// 平方根
    Sqrt,
    /// 绝对值
    Abs,
    /// 最小值
    Min,
    /// 最大值
    Max,
    /// Cox 比例风险死亡数
    CoxHazard,
    /// Nasari 相对风险
    LogLogRR,
    /// Krewski 相对风险
    HrRR,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "log" => Func::Log,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "min" => Func::Min,
            "max" => Func::Max,
            "coxHazard" => Func::CoxHazard,
            "loglogRR" => Func::LogLogRR,
            "hrRR" => Func::HrRR,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Min | Func::Max => 2,
            Func::CoxHazard => 3,
            _ => 1,
        }
    }

    fn call(self, a: &[f64]) -> f64 {
        match self {
            Func::Exp => a[0].exp(),
            Func::Log => a[0].ln(),
            Func::Sqrt => a[0].sqrt(),
            Func::Abs => a[0].abs(),
            Func::Min => a[0].min(a[1]),
            Func::Max => a[0].max(a[1]),
            Func::CoxHazard => cox_hazard(a[0], a[1], a[2]),
            Func::LogLogRR => loglog_rr(a[0]),
            Func::HrRR => hr_rr(a[0]),
        }
    }
}

/// 死亡数：(rr − 1)·pop·mort / 100000，死亡率单位为每 10 万人每年
pub fn cox_hazard(rr: f64, pop: f64, mort: f64) -> f64 {
    (rr - 1.0) * pop * mort / 100_000.0
}

/// Nasari 等 (2016) 对数-对数模型
pub fn loglog_rr(conc: f64) -> f64 {
    const THETA: f64 = 0.1430;
    const ALPHA: f64 = 1.6;
    const MU: f64 = 15.5;
    const NU: f64 = 36.8;
    let c = conc.max(0.0);
    (THETA * (c / ALPHA + 1.0).ln() / (1.0 + (-(c - MU) / NU).exp())).exp()
}

/// Krewski 等 (2009)：每 10 μg/m³ 风险比 1.06
pub fn hr_rr(conc: f64) -> f64 {
    (1.06f64.ln() / 10.0 * conc).exp()
}

// ============================================================================
// 解析
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> AmResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // 科学计数法
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| AmError::config(format!("无效数字 '{text}' in '{src}'")))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(AmError::config(format!("表达式 '{src}' 中有无法识别的字符 '{other}'")));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn error(&self, message: &str) -> AmError {
        AmError::config(format!("表达式 '{}' 解析失败: {message}", self.src))
    }

    fn expect(&mut self, token: Token) -> AmResult<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            _ => Err(self.error(&format!("期望 {token:?}"))),
        }
    }

    fn expr(&mut self) -> AmResult<Expr> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            let op = if c == '+' { Op::Add } else { Op::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> AmResult<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            let op = if c == '*' { Op::Mul } else { Op::Div };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> AmResult<Expr> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> AmResult<Expr> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Number(v)),
            Some(Token::LParen) => {
                let e = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Var(name));
                }
                let func = Func::lookup(&name).ok_or_else(|| self.error(&format!("未知函数 {name}")))?;
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.expr()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        args.push(self.expr()?);
                    }
                }
                self.expect(Token::RParen)?;
                if args.len() != func.arity() {
                    return Err(self.error(&format!("{name} 需要 {} 个参数", func.arity())));
                }
                Ok(Expr::Call(func, args))
            }
            _ => Err(self.error("意外的结尾或符号")),
        }
    }
}

impl Expr {
    /// 解析表达式
    pub fn parse(src: &str) -> AmResult<Self> {
        let mut parser = Parser {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        };
        let e = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("表达式末尾有多余内容"));
        }
        Ok(e)
    }

    /// 引用的变量名
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Neg(e) => e.collect_vars(out),
            Expr::Binary(_, a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_vars(out)),
        }
    }

    /// 求值；`lookup` 找不到变量时报错
    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<f64>) -> AmResult<f64> {
        Ok(match self {
            Expr::Number(v) => *v,
            Expr::Var(name) => lookup(name).ok_or_else(|| AmError::not_found(format!("变量 {name}")))?,
            Expr::Neg(e) => -e.eval(lookup)?,
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(lookup)?, b.eval(lookup)?);
                match op {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    Op::Div => a / b,
                }
            }
            Expr::Call(func, args) => {
                let values = args.iter().map(|a| a.eval(lookup)).collect::<AmResult<Vec<_>>>()?;
                func.call(&values)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, vars: &[(&str, f64)]) -> f64 {
        let lookup = |n: &str| vars.iter().find(|(k, _)| *k == n).map(|(_, v)| *v);
        Expr::parse(src).unwrap().eval(&lookup).unwrap()
    }

    #[test]
    fn test_precedence_and_unary() {
        assert_eq!(eval("1 + 2 * 3", &[]), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &[]), 9.0);
        assert_eq!(eval("-2 * -3", &[]), 6.0);
        assert_eq!(eval("10 / 4 - 1", &[]), 1.5);
        assert!((eval("2e3 + 1.5E-1", &[]) - 2000.15).abs() < 1e-9);
    }

    #[test]
    fn test_variables_and_functions() {
        assert_eq!(eval("a + b * 2", &[("a", 1.0), ("b", 4.0)]), 9.0);
        assert_eq!(eval("max(a, 3) + min(1, 2)", &[("a", 5.0)]), 6.0);
        assert_eq!(eval("abs(-4) + sqrt(9)", &[]), 7.0);
        let vars = Expr::parse("coxHazard(loglogRR(TotalPM25), TotalPop, AllCause)").unwrap().variables();
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec!["AllCause", "TotalPM25", "TotalPop"]);
    }

    #[test]
    fn test_health_functions() {
        assert!((loglog_rr(0.0) - 1.0).abs() < 1e-12);
        assert!(loglog_rr(10.0) > 1.0);
        assert!((hr_rr(10.0) - 1.06).abs() < 1e-12);
        assert_eq!(cox_hazard(1.0, 1000.0, 800.0), 0.0);
        assert!((cox_hazard(1.06, 100_000.0, 800.0) - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expr::parse("1 +").is_err());
        assert!(Expr::parse("foo(1)").is_err());
        assert!(Expr::parse("min(1)").is_err());
        assert!(Expr::parse("a $ b").is_err());
        assert!(Expr::parse("(a").is_err());
        let lookup = |_: &str| -> Option<f64> { None };
        assert!(Expr::parse("x").unwrap().eval(&lookup).is_err());
    }
}

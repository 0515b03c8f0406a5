//! Typed adapters for pure builtins.
//!
//! A pure builtin is written as an ordinary Rust function over typed
//! parameters (`f64`, `&str`, `Point`, `EntityId`, `Value`, or one of the list
//! views below) and erased into [`OperationFn`] by [`IntoOperation`] or
//! [`IntoVariadicOperation`]. Conversion failures surface as `TypeError`,
//! count mismatches as `ArityError`.

use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::Error;
use crate::ast::{NumberType, Value};

/// Erased signature every pure builtin is stored as
pub(crate) type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// One evaluated argument turned into a typed parameter
pub(crate) trait FromArg {
    type Param<'a>;

    /// Borrow from the argument slot, or take the value out of it
    fn from_arg<'a>(slot: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromArg for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<Value, Error> {
        Ok(std::mem::replace(slot, Value::Nil))
    }
}

// Numbers, points and entity names: anything ast.rs knows how to extract
impl<T> FromArg for T
where
    Value: TryInto<T, Error = Error>,
{
    type Param<'a> = T;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<T, Error> {
        std::mem::replace(slot, Value::Nil).try_into()
    }
}

impl FromArg for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<&'a str, Error> {
        match slot {
            Value::String(text) => Ok(text),
            other => Err(Error::TypeError(format!("expected string, got {other}"))),
        }
    }
}

/// A list argument. Nil reads as the empty list.
impl<K: ElementKind> FromArg for ListArg<'_, K> {
    type Param<'a> = ListArg<'a, K>;

    fn from_arg<'a>(slot: &'a mut Value) -> Result<ListArg<'a, K>, Error> {
        let Some(items) = slot.as_list() else {
            return Err(Error::TypeError(format!("expected list, got {slot}")));
        };
        ListArg::new(items)
    }
}

/// Trailing arguments collected into one parameter
pub(crate) trait FromRestArgs {
    type Param<'a>;

    fn from_rest<'a>(rest: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl<K: ElementKind> FromRestArgs for ListArg<'static, K> {
    type Param<'a> = ListArg<'a, K>;

    fn from_rest<'a>(rest: &'a [Value]) -> Result<ListArg<'a, K>, Error> {
        ListArg::new(rest)
    }
}

/// Element type of a [`ListArg`]: which values are accepted and what the
/// iterator yields for each
#[doc(hidden)]
pub trait ElementKind {
    type Item<'a>;
    /// Type name used in error messages
    const EXPECTED: &'static str;

    fn accepts(value: &Value) -> bool;
    fn view(value: &Value) -> Self::Item<'_>;
}

#[doc(hidden)]
pub struct AnyElement;

impl ElementKind for AnyElement {
    type Item<'a> = &'a Value;
    const EXPECTED: &'static str = "value";

    fn accepts(_: &Value) -> bool {
        true
    }

    fn view(value: &Value) -> &Value {
        value
    }
}

#[doc(hidden)]
pub struct NumberElement;

impl ElementKind for NumberElement {
    type Item<'a> = NumberType;
    const EXPECTED: &'static str = "number";

    fn accepts(value: &Value) -> bool {
        matches!(value, Value::Number(_))
    }

    fn view(value: &Value) -> NumberType {
        match value {
            Value::Number(n) => *n,
            _ => NumberType::NAN,
        }
    }
}

#[doc(hidden)]
pub struct StringElement;

impl ElementKind for StringElement {
    type Item<'a> = &'a str;
    const EXPECTED: &'static str = "string";

    fn accepts(value: &Value) -> bool {
        matches!(value, Value::String(_))
    }

    fn view(value: &Value) -> &str {
        match value {
            Value::String(text) => text,
            _ => "",
        }
    }
}

/// Checked view over a run of values. Every element is checked against `K`
/// when the view is built, so iterating never fails.
#[doc(hidden)]
pub struct ListArg<'a, K: ElementKind> {
    items: std::slice::Iter<'a, Value>,
    kind: PhantomData<K>,
}

impl<'a, K: ElementKind> ListArg<'a, K> {
    pub(crate) fn new(values: &'a [Value]) -> Result<Self, Error> {
        if let Some(bad) = values.iter().find(|v| !K::accepts(v)) {
            return Err(Error::TypeError(format!("expected {}, got {bad}", K::EXPECTED)));
        }
        Ok(ListArg {
            items: values.iter(),
            kind: PhantomData,
        })
    }
}

impl<'a, K: ElementKind> Iterator for ListArg<'a, K> {
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(K::view)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<K: ElementKind> DoubleEndedIterator for ListArg<'_, K> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.items.next_back().map(K::view)
    }
}

impl<K: ElementKind> ExactSizeIterator for ListArg<'_, K> {}
impl<K: ElementKind> FusedIterator for ListArg<'_, K> {}

pub type ValueIter<'a> = ListArg<'a, AnyElement>;
pub type NumIter<'a> = ListArg<'a, NumberElement>;
pub type StringIter<'a> = ListArg<'a, StringElement>;

/// What a builtin body may return: a bare `T: Into<Value>` or a `Result` of one
pub(crate) trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T: Into<Value>> IntoValueResult for Result<T, Error> {
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T: Into<Value>> IntoValueResult for T {
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Fixed-arity functions, keyed by their parameter tuple
pub(crate) trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Functions whose last parameter takes the remaining arguments
pub(crate) trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| match args.len() {
            0 => (self)().into_value_result(),
            got => Err(Error::arity_error(0, got)),
        })
    }
}

impl<F, R, I> IntoVariadicOperation<(I,)> for F
where
    I: FromRestArgs,
    F: for<'a> Fn(<I as FromRestArgs>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| (self)(I::from_rest(&args)?).into_value_result())
    }
}

/// Both adapters for `$count` leading typed parameters
macro_rules! impl_adapters {
    ($count:literal; $( $slot:ident : $A:ident ),+) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            $( $A: FromArg, )+
            F: for<'a> Fn( $( <$A as FromArg>::Param<'a> ),+ ) -> R + Send + Sync + 'static,
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let got = args.len();
                    let [ $( $slot ),+ ] = args.as_mut_slice() else {
                        return Err(Error::arity_error($count, got));
                    };
                    (self)( $( $A::from_arg($slot)? ),+ ).into_value_result()
                })
            }
        }

        impl<F, R, I, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            $( $A: FromArg, )+
            I: FromRestArgs,
            F: for<'a> Fn(
                    $( <$A as FromArg>::Param<'a>, )+
                    <I as FromRestArgs>::Param<'a>,
                ) -> R
                + Send
                + Sync
                + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let got = args.len();
                    let [ $( $slot, )+ rest @ .. ] = args.as_mut_slice() else {
                        return Err(Error::arity_error($count, got));
                    };
                    (self)( $( $A::from_arg($slot)?, )+ I::from_rest(rest)? ).into_value_result()
                })
            }
        }
    };
}

impl_adapters!(1; a: A1);
impl_adapters!(2; a: A1, b: A2);
impl_adapters!(3; a: A1, b: A2, c: A3);
impl_adapters!(4; a: A1, b: A2, c: A3, d: A4);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};
    use crate::host::Point;

    fn fixed<Args, F: IntoOperation<Args>>(f: F) -> Arc<OperationFn> {
        f.into_operation()
    }

    fn variadic<Args, F: IntoVariadicOperation<Args>>(f: F) -> Arc<OperationFn> {
        f.into_variadic_operation()
    }

    fn add(a: NumberType, b: NumberType) -> NumberType {
        a + b
    }

    fn text_len(s: &str) -> usize {
        s.len()
    }

    fn point_x(p: Point) -> NumberType {
        p.x
    }

    fn sum(nums: NumIter<'_>) -> NumberType {
        nums.sum()
    }

    fn join(sep: &str, parts: StringIter<'_>) -> String {
        parts.collect::<Vec<_>>().join(sep)
    }

    fn count(items: ValueIter<'_>) -> usize {
        items.len()
    }

    #[test]
    fn test_fixed_adapters() {
        let add = fixed::<(NumberType, NumberType), _>(add);
        assert_eq!(add(vec![val(2), val(3)]).unwrap(), val(5));
        assert!(matches!(add(vec![val(2)]), Err(Error::ArityError { .. })));
        assert!(matches!(add(vec![val(2), val("x")]), Err(Error::TypeError(_))));

        let len = fixed::<(&str,), _>(text_len);
        assert_eq!(len(vec![val("abc")]).unwrap(), val(3));

        let x = fixed::<(Point,), _>(point_x);
        assert_eq!(x(vec![val([4, 5])]).unwrap(), val(4));
    }

    #[test]
    fn test_variadic_adapters() {
        let sum = variadic::<(NumIter<'static>,), _>(sum);
        assert_eq!(sum(vec![]).unwrap(), val(0));
        assert_eq!(sum(vec![val(1), val(2.5)]).unwrap(), val(3.5));
        assert!(matches!(sum(vec![val(1), nil()]), Err(Error::TypeError(_))));

        let join = variadic::<(&str, StringIter<'static>), _>(join);
        assert_eq!(join(vec![val("-"), val("a"), val("b")]).unwrap(), val("a-b"));
        assert!(matches!(join(vec![]), Err(Error::ArityError { .. })));
    }

    #[test]
    fn test_list_parameter_accepts_nil() {
        let len = fixed::<(ValueIter<'static>,), _>(count);
        assert_eq!(len(vec![nil()]).unwrap(), val(0));
        assert_eq!(len(vec![val([1, 2])]).unwrap(), val(2));
        assert!(matches!(len(vec![val(1)]), Err(Error::TypeError(_))));
    }
}

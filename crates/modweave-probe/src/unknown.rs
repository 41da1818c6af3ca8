use mlua::{Function, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value};

const MAX_PATH: usize = 160;

/// Stand-in for a value the sandbox cannot provide: an undefined global, a
/// module nobody loaded, or anything derived from one. Every operation on it
/// yields another `Unknown` so scripts keep running past the gap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unknown {
    path: String,
}

impl Unknown {
    pub fn root(name: &str) -> Self {
        Self {
            path: clip(name.to_owned()),
        }
    }

    /// The access path this value stands for, e.g. `Foo.Bar()`.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn field(&self, key: &Value) -> Self {
        let path = match key {
            Value::String(s) => format!("{}.{}", self.path, s.to_string_lossy()),
            Value::Integer(i) => format!("{}[{i}]", self.path),
            Value::Number(n) => format!("{}[{n}]", self.path),
            _ => format!("{}[?]", self.path),
        };
        Self { path: clip(path) }
    }

    fn called(&self) -> Self {
        Self {
            path: clip(format!("{}()", self.path)),
        }
    }

    fn binary(lhs: &Value, op: &str, rhs: &Value) -> Self {
        Self {
            path: clip(format!("({} {op} {})", describe(lhs), describe(rhs))),
        }
    }

    fn unary(op: &str, operand: &Value) -> Self {
        Self {
            path: clip(format!("{op}{}", describe(operand))),
        }
    }
}

fn clip(mut path: String) -> String {
    if path.len() > MAX_PATH {
        let mut cut = MAX_PATH;
        while !path.is_char_boundary(cut) {
            cut -= 1;
        }
        path.truncate(cut);
        path.push('…');
    }
    path
}

fn describe(value: &Value) -> String {
    match value {
        Value::UserData(ud) => ud
            .borrow::<Unknown>()
            .map_or_else(|_| "userdata".to_owned(), |u| u.path.clone()),
        Value::String(s) => format!("{:?}", s.to_string_lossy().to_string()),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Nil => "nil".to_owned(),
        other => other.type_name().to_owned(),
    }
}

/// Whether `value` is an [`Unknown`] stand-in.
pub fn is_unknown(value: &Value) -> bool {
    matches!(value, Value::UserData(ud) if ud.is::<Unknown>())
}

/// An iterator triple that stops immediately.
pub fn empty_iteration(lua: &Lua) -> mlua::Result<(Function, Value, Value)> {
    let next = lua.create_function(|_, _: MultiValue| Ok(Value::Nil))?;
    Ok((next, Value::Nil, Value::Nil))
}

fn first_operand(args: &MultiValue) -> Value {
    args.iter().next().cloned().unwrap_or(Value::Nil)
}

impl UserData for Unknown {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |_, this, key: Value| Ok(this.field(&key)));
        methods.add_meta_method(MetaMethod::NewIndex, |_, _, _: (Value, Value)| Ok(()));
        methods.add_meta_method(MetaMethod::Call, |_, this, _: MultiValue| Ok(this.called()));
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.path.clone()));

        for (method, op) in [
            (MetaMethod::Add, "+"),
            (MetaMethod::Sub, "-"),
            (MetaMethod::Mul, "*"),
            (MetaMethod::Div, "/"),
            (MetaMethod::Mod, "%"),
            (MetaMethod::Pow, "^"),
            (MetaMethod::IDiv, "//"),
            (MetaMethod::BAnd, "&"),
            (MetaMethod::BOr, "|"),
            (MetaMethod::BXor, "~"),
            (MetaMethod::Shl, "<<"),
            (MetaMethod::Shr, ">>"),
            (MetaMethod::Concat, ".."),
        ] {
            methods.add_meta_function(method, move |_, (lhs, rhs): (Value, Value)| {
                Ok(Unknown::binary(&lhs, op, &rhs))
            });
        }

        // Lua passes the operand twice to unary metamethods.
        for (method, op) in [(MetaMethod::Unm, "-"), (MetaMethod::BNot, "~")] {
            methods.add_meta_function(method, move |_, args: MultiValue| {
                Ok(Unknown::unary(op, &first_operand(&args)))
            });
        }

        // An unknown sequence is empty, so `for i = 1, #t` runs zero times.
        methods.add_meta_method(MetaMethod::Len, |_, _, _: MultiValue| Ok(0));

        for method in [MetaMethod::Eq, MetaMethod::Lt, MetaMethod::Le] {
            methods.add_meta_function(method, |_, _: MultiValue| Ok(false));
        }

        // `pairs(unknown)` iterates nothing. `ipairs` is guarded by the sandbox.
        methods.add_meta_method(MetaMethod::Pairs, |lua, _, ()| empty_iteration(lua));
    }
}

use archetype::{Runtime, Value};

fn main() {
    env_logger::init();

    let rt = Runtime::new();

    let shape = rt.create(vec![
        ("kind", Value::from("shape")),
        (
            "to_string",
            Value::method(|rt, this, _| {
                let id = this.as_object().expect("bound receiver");
                let kind = rt
                    .get(id, "kind")
                    .unwrap_or(Value::Null);
                Value::from(format!("{kind} {id}"))
            }),
        ),
        (
            ":same_kind",
            Value::method(|rt, _, args| {
                let a = args[0].as_object().expect("caller");
                let b = args[1].as_object().expect("operand");
                Value::from(rt.get(a, "kind") == rt.get(b, "kind"))
            }),
        ),
    ]);

    let circle = rt
        .extend(shape, vec![("kind", Value::from("circle")), ("radius", Value::from(2i64))])
        .expect("shape is extensible");
    let square = rt
        .extend(shape, vec![("kind", Value::from("square")), ("side", Value::from(3i64))])
        .expect("shape is extensible");

    println!("{}", rt.stringify(shape));
    println!("{}", rt.stringify(circle));
    println!("{}", rt.stringify(square));

    let same = rt
        .call(circle, "same_kind", &[Value::Object(square)])
        .expect("inherited static method");
    println!("circle and square share a kind: {same}");

    rt.freeze(circle);
    assert!(!rt.set(circle, "radius", Value::from(5i64)));
    println!(
        "radius after frozen write: {}",
        rt.get(circle, "radius").unwrap_or(Value::Null)
    );
    rt.unfreeze(circle);
    assert!(rt.set(circle, "radius", Value::from(5i64)));
    println!(
        "radius after unfreeze: {}",
        rt.get(circle, "radius").unwrap_or(Value::Null)
    );

    println!("children of shape: {:?}", rt.get_instances(shape));
    println!("chain of circle:   {:?}", rt.get_prototypes(circle));

    rt.dispose(square);
    println!("children after disposal: {:?}", rt.get_instances(shape));
}

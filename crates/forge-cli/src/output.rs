use serde_json::Value;

fn cell<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("-")
}

pub fn print_node_table(nodes: &[Value]) {
    if nodes.is_empty() {
        println!("no nodes");
        return;
    }
    println!(
        "{:<38} {:<12} {:<12} {:<12} {:<38}",
        "UUID", "DRIVER", "POWER", "PROVISION", "INSTANCE"
    );
    for node in nodes {
        println!(
            "{:<38} {:<12} {:<12} {:<12} {:<38}",
            cell(node, "uuid"),
            cell(node, "driver"),
            cell(node, "power_state"),
            cell(node, "provision_state"),
            cell(node, "instance_uuid"),
        );
    }
}

pub fn print_chassis_table(chassis: &[Value]) {
    if chassis.is_empty() {
        println!("no chassis");
        return;
    }
    println!("{:<38} {}", "UUID", "DESCRIPTION");
    for ch in chassis {
        println!("{:<38} {}", cell(ch, "uuid"), cell(ch, "description"));
    }
}

pub fn print_json(v: &Value) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{v}"),
    }
}

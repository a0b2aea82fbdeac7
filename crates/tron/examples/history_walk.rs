//! Build a map document, update it twice, then walk the root history.

use tron::{
    empty_map_root, map_get, map_iter_entries, map_set_node, parse_trailer, Builder, Result,
    Value,
};

fn print_map(doc: &[u8], root: u32) -> Result<()> {
    print!("{{");
    let mut first = true;
    map_iter_entries(doc, root, |key, val| {
        if !first {
            print!(", ");
        }
        first = false;
        print!("{:?}: {val:?}", String::from_utf8_lossy(key));
        Ok(())
    })?;
    println!("}}");
    Ok(())
}

fn main() -> Result<()> {
    // Version 1: {"name": "tron"}
    let mut b = Builder::new();
    let empty = empty_map_root(&mut b)?;
    let (v1, _) = map_set_node(&mut b, empty, b"name", &Value::Text(b"tron"))?;
    let doc1 = b.bytes_with_trailer(v1, 0);

    // Version 2: add a counter, then bump it. Each update shares every
    // unchanged node with the version before it.
    let (mut b, t1) = Builder::from_document(&doc1)?;
    let (v2, _) = map_set_node(&mut b, t1.root_offset, b"count", &Value::I64(1))?;
    let (v3, _) = map_set_node(&mut b, v2, b"count", &Value::I64(2))?;
    let doc = b.bytes_with_trailer(v3, v2);

    let trailer = parse_trailer(&doc)?;
    println!("document: {} bytes", doc.len());

    print!("current  @{:>4}: ", trailer.root_offset);
    print_map(&doc, trailer.root_offset)?;
    print!("previous @{:>4}: ", trailer.prev_root_offset);
    print_map(&doc, trailer.prev_root_offset)?;
    print!("v1       @{:>4}: ", v1);
    print_map(&doc, v1)?;

    // Old roots answer point lookups too.
    assert_eq!(map_get(&doc, v2, b"count")?, Some(Value::I64(1)));
    assert_eq!(map_get(&doc, v1, b"count")?, None);

    Ok(())
}

use std::time::Duration;

use flowgen::{AddNodeOptions, ChannelEvent, ChannelOptions, Config, EditorBuilder, NodeData, StaticIdentity, TextData, User};

#[tokio::main]
async fn main() {
    let config = Config::load_from_str(include_str!("./config.toml")).unwrap();

    let editor = EditorBuilder::new().config(config).identity(StaticIdentity::user(User::new("demo", "Demo User"))).build().unwrap();

    editor.launch();

    let mut session = editor.create("Simple flow").await.unwrap();
    let doc = session.id().to_string();

    ChannelEvent::channel(editor.channel(), ChannelOptions::with_doc(doc.to_owned())).unwrap().on_variant_changed(move |nid, e| {
        println!("Node {} is now {:?} (was {:?})", nid, e.to, e.from);
    });

    ChannelEvent::channel(editor.channel(), ChannelOptions::with_doc(doc.to_owned())).unwrap().on_save(move |e| {
        println!("Save: {:?}", e);
    });

    let source = session
        .add_node(
            "text",
            AddNodeOptions::default().with_data(NodeData::Text(TextData {
                text: "A fox jumps over the lazy dog.".to_string(),
                ..Default::default()
            })),
        )
        .unwrap();
    let summary = session
        .add_node(
            "text",
            AddNodeOptions::default().with_data(NodeData::Text(TextData {
                instructions: "Summarize:".to_string(),
                ..Default::default()
            })),
        )
        .unwrap();
    session.connect(&source, None, &summary, None).unwrap();

    let jobs = session.generate_all().unwrap();
    session.jobs().wait_all(&jobs).await.unwrap();
    session.apply_finished_jobs().unwrap();

    let output = session.document().content().node(&summary).and_then(|n| n.data().output_value());
    println!("Output: {:#?}", output);

    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("Dirty after autosave: {}", session.is_dirty());

    session.close().await.unwrap();
    editor.shutdown();
}

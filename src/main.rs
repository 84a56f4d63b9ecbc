#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    duoline::rocket().launch().await?;
    Ok(())
}
